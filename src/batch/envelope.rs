//! The textual envelope a batch travels in:
//!
//! ```text
//! [ID: /items/item[1]/name[1]]
//! Kinetic Blade
//! ---
//! ```
//!
//! Text may span several lines; a record ends at the first line that is exactly `---`.
//! Payload lines that would read as a separator or an ID line, or that already start with a
//! backslash, travel with one extra leading backslash which the parser strips again.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ir::TextEntry;

pub const SEPARATOR: &str = "---";

static ID_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[ID:\s*(.+?)\]\s*$").expect("envelope id line"));

pub fn encode_batch(batch: &[TextEntry]) -> String {
    encode_pairs(batch.iter().map(|e| (e.address.as_str(), e.text.as_str())))
}

pub fn encode_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (address, text) in pairs {
        out.push_str("[ID: ");
        out.push_str(address);
        out.push_str("]\n");
        for line in text.split('\n') {
            if needs_escape(line) {
                out.push('\\');
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(SEPARATOR);
        out.push('\n');
    }
    out
}

fn needs_escape(line: &str) -> bool {
    let line = line.trim_end_matches('\r');
    line.trim() == SEPARATOR || line.trim_start().starts_with('\\') || ID_LINE_RE.is_match(line)
}

fn unescape(line: &str) -> &str {
    line.strip_prefix('\\').unwrap_or(line)
}

/// Every complete `(address, text)` record in `response`, in order. Records cut short by a
/// new ID line or the end of input are dropped.
pub fn parse_response(response: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in response.lines() {
        if let Some(cap) = ID_LINE_RE.captures(line) {
            current = Some((cap[1].trim().to_string(), Vec::new()));
            continue;
        }
        if line.trim() == SEPARATOR {
            if let Some((address, lines)) = current.take() {
                out.push((address, lines.join("\n").trim().to_string()));
            }
            continue;
        }
        if let Some((_, lines)) = current.as_mut() {
            lines.push(unescape(line));
        }
    }
    out
}

/// Outcome of matching one reply against the batch that produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchParse {
    /// In batch order.
    pub translated: Vec<(String, String)>,
    /// Batch addresses with no usable text in the reply.
    pub missing: Vec<String>,
    /// IDs in the reply that were not part of the batch.
    pub unexpected: Vec<String>,
}

/// First occurrence of an address wins; blank payloads count as missing.
pub fn reconcile(batch: &[TextEntry], response: &str) -> BatchParse {
    let wanted: HashSet<&str> = batch.iter().map(|e| e.address.as_str()).collect();
    let mut found: HashMap<String, String> = HashMap::new();
    let mut unexpected = Vec::new();

    for (address, text) in parse_response(response) {
        if !wanted.contains(address.as_str()) {
            unexpected.push(address);
            continue;
        }
        if text.is_empty() {
            continue;
        }
        found.entry(address).or_insert(text);
    }

    let mut parsed = BatchParse {
        unexpected,
        ..BatchParse::default()
    };
    for entry in batch {
        match found.remove(&entry.address) {
            Some(text) => parsed.translated.push((entry.address.clone(), text)),
            None => parsed.missing.push(entry.address.clone()),
        }
    }
    parsed
}
