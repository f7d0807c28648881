use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use xml_loc_translator::batch::envelope::encode_pairs;
use xml_loc_translator::batch::{BatchEngine, BatchSettings, CancellationToken, Checkpoint, RunState};
use xml_loc_translator::error::ProviderError;
use xml_loc_translator::ir::TextEntry;
use xml_loc_translator::providers::{ProviderConfig, TranslationProvider};
use xml_loc_translator::xml::{
    compare, compare_files, extract_file, fingerprint, inject_file, parse_document, write_document, ExtractQuery,
};

/// Records every address it is asked for; can drop addresses or cancel a token mid-run.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
    calls: Mutex<usize>,
    drop_address: Option<String>,
    cancel_on_call: Option<(usize, CancellationToken)>,
}

impl TranslationProvider for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn translate(&self, text: &str, _cfg: &ProviderConfig) -> Result<String, ProviderError> {
        Ok(format!("T:{text}"))
    }

    fn translate_block(&self, batch: &[TextEntry], _cfg: &ProviderConfig) -> Result<String, ProviderError> {
        let call = {
            let mut calls = self.calls.lock().expect("lock");
            *calls += 1;
            *calls
        };
        if let Some((n, token)) = &self.cancel_on_call {
            if *n == call {
                token.cancel();
            }
        }
        self.seen
            .lock()
            .expect("lock")
            .extend(batch.iter().map(|e| e.address.clone()));
        let pairs: Vec<(String, String)> = batch
            .iter()
            .filter(|e| Some(&e.address) != self.drop_address.as_ref())
            .map(|e| (e.address.clone(), format!("T:{}", e.text)))
            .collect();
        Ok(encode_pairs(pairs.iter().map(|(a, t)| (a.as_str(), t.as_str()))))
    }
}

fn entries(n: usize) -> Vec<TextEntry> {
    (1..=n)
        .map(|i| TextEntry::new(format!("/items/item[{i}]/name[1]"), format!("Item {i}")))
        .collect()
}

fn settings(dir: &Path, size: usize) -> BatchSettings {
    BatchSettings {
        batch_size: size,
        delay: Duration::ZERO,
        ..BatchSettings::new(dir.join("items.checkpoint.json"))
    }
}

#[test]
fn resumed_run_only_sends_what_the_checkpoint_lacks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let all = entries(10);
    let mut checkpoint = Checkpoint::load(&dir.path().join("items.checkpoint.json"));
    checkpoint.merge(
        all.iter()
            .take(3)
            .map(|e| (e.address.clone(), format!("done {}", e.text))),
    );
    checkpoint.save().expect("save");

    let provider = Arc::new(Recorder::default());
    let engine = BatchEngine::new(settings(dir.path(), 4), provider.clone(), ProviderConfig::default());
    let (tx, _rx) = mpsc::channel();
    let summary = engine.run(&all, &CancellationToken::new(), &tx);

    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.batches_run, 2);
    assert_eq!(summary.translated, 7);
    let seen = provider.seen.lock().expect("lock").clone();
    assert_eq!(seen.len(), 7);
    assert!(!seen.contains(&all[0].address));

    let reloaded = Checkpoint::load(&dir.path().join("items.checkpoint.json"));
    assert_eq!(reloaded.len(), 10);
    assert_eq!(reloaded.get(&all[0].address), Some("done Item 1"));
    assert_eq!(reloaded.get(&all[9].address), Some("T:Item 10"));
}

#[test]
fn dropped_entry_is_skipped_and_retried_next_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let all = entries(5);
    let provider = Arc::new(Recorder {
        drop_address: Some(all[2].address.clone()),
        ..Recorder::default()
    });
    let engine = BatchEngine::new(settings(dir.path(), 10), provider, ProviderConfig::default());
    let (tx, _rx) = mpsc::channel();
    let summary = engine.run(&all, &CancellationToken::new(), &tx);

    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.translated, 4);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.checkpoint_len, 4);

    let second = Arc::new(Recorder::default());
    let engine = BatchEngine::new(settings(dir.path(), 10), second.clone(), ProviderConfig::default());
    let (tx, _rx) = mpsc::channel();
    let summary = engine.run(&all, &CancellationToken::new(), &tx);
    assert_eq!(summary.checkpoint_len, 5);
    assert_eq!(*second.seen.lock().expect("lock"), vec![all[2].address.clone()]);
}

#[test]
fn cancellation_during_a_batch_stops_before_the_next_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cancel = CancellationToken::new();
    let provider = Arc::new(Recorder {
        cancel_on_call: Some((2, cancel.clone())),
        ..Recorder::default()
    });
    let engine = BatchEngine::new(settings(dir.path(), 2), provider.clone(), ProviderConfig::default());
    let (tx, _rx) = mpsc::channel();
    let summary = engine.run(&entries(8), &cancel, &tx);

    assert_eq!(summary.state, RunState::Cancelled);
    // the batch in flight when cancel fired still completes and is saved
    assert_eq!(summary.batches_run, 2);
    assert_eq!(summary.checkpoint_len, 4);
    assert_eq!(*provider.calls.lock().expect("lock"), 2);
    assert_eq!(Checkpoint::load(&dir.path().join("items.checkpoint.json")).len(), 4);
}

const ITEMS: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<items>\n  <!-- weapons -->\n  <item id=\"1\">\n    <name>Sword</name>\n    <desc>Sharp</desc>\n  </item>\n  <item id=\"2\">\n    <name> Shield </name>\n    <icon path=\"a.png\" />\n  </item>\n</items>\n";

#[test]
fn injecting_the_original_text_reproduces_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("items.xml");
    let output = dir.path().join("items_translated.xml");
    std::fs::write(&input, ITEMS).expect("write");

    let found = extract_file(&input, &ExtractQuery::new(Some("item"), "name")).expect("extract");
    assert_eq!(found.len(), 2);
    let map: BTreeMap<String, String> = found.into_iter().map(|e| (e.address, e.text)).collect();

    let report = inject_file(&input, &map, &output).expect("inject");
    assert_eq!(report.modified, 2);
    assert!(compare_files(&input, &output).expect("compare").identical);
    assert_eq!(std::fs::read_to_string(&output).expect("read"), ITEMS);
}

#[test]
fn translated_output_keeps_structure_and_padding() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("items.xml");
    let output = dir.path().join("out/items_pt.xml");
    std::fs::write(&input, ITEMS).expect("write");

    let mut map = BTreeMap::new();
    map.insert("/items/item[2]/name[1]".to_string(), "Escudo & cia".to_string());
    map.insert("/items/item[9]/name[1]".to_string(), "Nada".to_string());
    let report = inject_file(&input, &map, &output).expect("inject");
    assert_eq!(report.modified, 1);
    assert_eq!(report.unresolved, vec!["/items/item[9]/name[1]".to_string()]);

    let written = std::fs::read_to_string(&output).expect("read");
    assert!(written.contains("<name> Escudo &amp; cia </name>"));
    assert!(written.contains("<!-- weapons -->"));
    assert!(compare_files(&input, &output).expect("compare").identical);
}

#[test]
fn removing_an_element_is_reported_by_the_validator() {
    let before = parse_document("a.xml", ITEMS.as_bytes()).expect("parse");
    let after = parse_document("b.xml", ITEMS.replace("    <desc>Sharp</desc>\n", "").as_bytes()).expect("parse");
    let same = compare(&fingerprint(&before), &fingerprint(&before));
    assert!(same.identical);

    let diff = compare(&fingerprint(&before), &fingerprint(&after));
    assert!(!diff.identical);
    assert!(diff.mentions("desc"));

    let rewritten = parse_document("c.xml", &write_document(&before)).expect("reparse");
    assert!(compare(&fingerprint(&before), &fingerprint(&rewritten)).identical);
}
