use std::path::Path;

use crate::error::ExtractError;
use crate::ir::TextEntry;

use super::address::AddressBook;
use super::document::{read_document, XmlDocument};

/// Which elements carry translatable text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractQuery {
    pub parent_tag: Option<String>,
    pub target_tag: String,
}

impl ExtractQuery {
    pub fn new(parent_tag: Option<&str>, target_tag: &str) -> Self {
        Self {
            parent_tag: parent_tag
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            target_tag: target_tag.trim().to_string(),
        }
    }

    /// Only descendants of the root are candidates; the root itself never matches, nor does it
    /// count as a parent.
    fn matches(&self, doc: &XmlDocument, id: usize) -> bool {
        let el = doc.element(id);
        if id == doc.root() || el.tag != self.target_tag {
            return false;
        }
        match &self.parent_tag {
            None => true,
            Some(parent) => el
                .parent
                .is_some_and(|p| p != doc.root() && doc.tag(p) == parent),
        }
    }
}

/// Collects `(address, trimmed text)` for every matching element with non-blank text, in
/// document order.
pub fn extract_texts(doc: &XmlDocument, query: &ExtractQuery) -> Result<Vec<TextEntry>, ExtractError> {
    let book = AddressBook::build(doc);
    let mut matched = 0usize;
    let mut out = Vec::new();

    for id in 0..doc.len() {
        if !query.matches(doc, id) {
            continue;
        }
        matched += 1;
        let text = doc.text_of(id);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        out.push(TextEntry::new(book.address(id), text));
    }

    if matched == 0 {
        return Err(ExtractError::NoMatches {
            parent_tag: query.parent_tag.clone(),
            target_tag: query.target_tag.clone(),
        });
    }
    if out.is_empty() {
        return Err(ExtractError::NoTextContent {
            target_tag: query.target_tag.clone(),
            matched,
        });
    }

    tracing::debug!(
        "extracted {} of {} <{}> element(s) from {}",
        out.len(),
        matched,
        query.target_tag,
        doc.name
    );
    Ok(out)
}

pub fn extract_file(path: &Path, query: &ExtractQuery) -> Result<Vec<TextEntry>, ExtractError> {
    let doc = read_document(path)?;
    extract_texts(&doc, query)
}
