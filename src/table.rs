use std::collections::{BTreeMap, HashMap};

use crate::batch::BatchEvent;
use crate::error::ProviderFailure;
use crate::ir::{RowStatus, TextEntry};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRow {
    pub address: String,
    pub original: String,
    pub translation: String,
    pub status: RowStatus,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    pub total: usize,
    pub translated: usize,
}

impl TableStats {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.translated as f64 * 100.0 / self.total as f64
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub updated: usize,
    /// Addresses not in the table.
    pub ignored: usize,
    pub blank: usize,
}

/// The review table: one row per extracted address, in extraction order.
///
/// Rows are only created by [`ReviewTable::load_extraction`]; every other mutation targets an
/// existing address and is a no-op for unknown ones.
#[derive(Clone, Debug, Default)]
pub struct ReviewTable {
    rows: Vec<TableRow>,
    index: HashMap<String, usize>,
}

impl ReviewTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all rows; every row starts untranslated.
    pub fn load_extraction(&mut self, entries: Vec<TextEntry>) {
        self.rows.clear();
        self.index.clear();
        for entry in entries {
            if self.index.contains_key(&entry.address) {
                continue;
            }
            self.index.insert(entry.address.clone(), self.rows.len());
            self.rows.push(TableRow {
                address: entry.address,
                original: entry.text,
                translation: String::new(),
                status: RowStatus::Untranslated,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    pub fn get(&self, address: &str) -> Option<&TableRow> {
        self.index.get(address).map(|&i| &self.rows[i])
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    /// `(address, original)` in table order.
    pub fn entries(&self) -> Vec<TextEntry> {
        self.rows
            .iter()
            .map(|r| TextEntry::new(r.address.clone(), r.original.clone()))
            .collect()
    }

    fn row_mut(&mut self, address: &str) -> Option<&mut TableRow> {
        let i = *self.index.get(address)?;
        self.rows.get_mut(i)
    }

    /// Marks the row as in flight and returns its previous status.
    pub fn begin_suggestion(&mut self, address: &str) -> Option<RowStatus> {
        let row = self.row_mut(address)?;
        let prior = row.status;
        row.status = RowStatus::Translating;
        Some(prior)
    }

    /// Stores a successful suggestion, or puts the prior status back on failure.
    pub fn finish_suggestion(&mut self, address: &str, prior: RowStatus, result: &Result<String, ProviderFailure>) {
        let Some(row) = self.row_mut(address) else {
            return;
        };
        match result {
            Ok(text) if !text.trim().is_empty() => {
                row.translation = text.trim().to_string();
                row.status = RowStatus::Translated;
            }
            _ => row.status = prior,
        }
    }

    /// Runs `translate` on the row's original text with the row marked as translating.
    pub fn suggest(
        &mut self,
        address: &str,
        translate: impl FnOnce(&str) -> Result<String, ProviderFailure>,
    ) -> Option<Result<String, ProviderFailure>> {
        let original = self.get(address)?.original.clone();
        let prior = self.begin_suggestion(address)?;
        let result = translate(&original);
        self.finish_suggestion(address, prior, &result);
        Some(result)
    }

    pub fn apply_translation(&mut self, address: &str, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let Some(row) = self.row_mut(address) else {
            return false;
        };
        row.translation = text.to_string();
        row.status = RowStatus::Translated;
        true
    }

    /// Foreground side of a batch run.
    pub fn apply_event(&mut self, event: &BatchEvent) -> bool {
        match event {
            BatchEvent::Translated { address, text } => self.apply_translation(address, text),
            _ => false,
        }
    }

    /// Bulk overwrite by address. Unknown addresses are never added.
    pub fn import_map(&mut self, map: &BTreeMap<String, String>) -> ImportReport {
        let mut report = ImportReport::default();
        for (address, text) in map {
            if !self.contains(address.trim()) {
                report.ignored += 1;
                continue;
            }
            if text.trim().is_empty() {
                report.blank += 1;
                continue;
            }
            if self.apply_translation(address.trim(), text) {
                report.updated += 1;
            }
        }
        report
    }

    /// Operator approval of an edited translation.
    pub fn approve(&mut self, address: &str, edited: &str) -> bool {
        let Some(row) = self.row_mut(address) else {
            return false;
        };
        row.translation = edited.trim().to_string();
        row.status = RowStatus::Translated;
        true
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            total: self.rows.len(),
            translated: self
                .rows
                .iter()
                .filter(|r| r.status == RowStatus::Translated)
                .count(),
        }
    }

    /// Non-blank translations, for export and injection.
    pub fn translation_map(&self) -> BTreeMap<String, String> {
        self.rows
            .iter()
            .filter(|r| !r.translation.trim().is_empty())
            .map(|r| (r.address.clone(), r.translation.clone()))
            .collect()
    }

    pub fn source_map(&self) -> BTreeMap<String, String> {
        self.rows
            .iter()
            .map(|r| (r.address.clone(), r.original.clone()))
            .collect()
    }
}
