use std::collections::BTreeMap;
use std::path::Path;

use crate::error::XmlError;

use super::document::{read_document, XmlDocument};

pub type Fingerprint = BTreeMap<String, usize>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountMismatch {
    pub tag: String,
    pub left: usize,
    pub right: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructureDiff {
    pub identical: bool,
    /// Tags present on the left only.
    pub missing: Vec<String>,
    /// Tags present on the right only.
    pub extra: Vec<String>,
    pub mismatched_counts: Vec<CountMismatch>,
}

impl StructureDiff {
    pub fn mentions(&self, tag: &str) -> bool {
        self.missing.iter().any(|t| t == tag)
            || self.extra.iter().any(|t| t == tag)
            || self.mismatched_counts.iter().any(|m| m.tag == tag)
    }

    pub fn summary(&self) -> String {
        if self.identical {
            return "structure identical".to_string();
        }
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing: {}", self.missing.join(", ")));
        }
        if !self.extra.is_empty() {
            parts.push(format!("extra: {}", self.extra.join(", ")));
        }
        if !self.mismatched_counts.is_empty() {
            let counts: Vec<String> = self
                .mismatched_counts
                .iter()
                .map(|m| format!("{} {}→{}", m.tag, m.left, m.right))
                .collect();
            parts.push(format!("count changed: {}", counts.join(", ")));
        }
        parts.join("; ")
    }
}

pub fn fingerprint(doc: &XmlDocument) -> Fingerprint {
    let mut fp = Fingerprint::new();
    for el in &doc.elements {
        *fp.entry(el.tag.clone()).or_insert(0) += 1;
    }
    fp
}

pub fn compare(left: &Fingerprint, right: &Fingerprint) -> StructureDiff {
    let mut diff = StructureDiff::default();
    for (tag, &l) in left {
        match right.get(tag) {
            None => diff.missing.push(tag.clone()),
            Some(&r) if r != l => diff.mismatched_counts.push(CountMismatch {
                tag: tag.clone(),
                left: l,
                right: r,
            }),
            Some(_) => {}
        }
    }
    diff.extra = right
        .keys()
        .filter(|tag| !left.contains_key(*tag))
        .cloned()
        .collect();
    diff.identical =
        diff.missing.is_empty() && diff.extra.is_empty() && diff.mismatched_counts.is_empty();
    diff
}

pub fn compare_files(left: &Path, right: &Path) -> Result<StructureDiff, XmlError> {
    let a = read_document(left)?;
    let b = read_document(right)?;
    Ok(compare(&fingerprint(&a), &fingerprint(&b)))
}
