use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{FileError, XmlError};

use super::address::AddressBook;
use super::document::{read_document, write_document, XmlDocument};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InjectReport {
    pub modified: usize,
    /// Addresses that no longer resolve in the document.
    pub unresolved: Vec<String>,
    /// Addresses whose element has no text to replace.
    pub skipped_empty: Vec<String>,
}

/// Applies `translations` to a copy of `doc`, touching only the text of addressed elements.
pub fn inject_translations(
    doc: &XmlDocument,
    translations: &BTreeMap<String, String>,
) -> Result<(XmlDocument, InjectReport), XmlError> {
    let book = AddressBook::build(doc);
    let mut out = doc.clone();
    let mut report = InjectReport::default();

    for (address, translated) in translations {
        if translated.trim().is_empty() {
            continue;
        }
        let Some(id) = book.resolve(address) else {
            report.unresolved.push(address.clone());
            continue;
        };
        let current = out.text_of(id);
        if current.trim().is_empty() {
            report.skipped_empty.push(address.clone());
            continue;
        }
        out.set_text(id, &keep_padding(&current, translated.trim()));
        report.modified += 1;
    }

    out.verify_structure_unchanged()?;
    Ok((out, report))
}

fn keep_padding(original: &str, replacement: &str) -> String {
    let lead = &original[..original.len() - original.trim_start().len()];
    let trail = &original[original.trim_end().len()..];
    format!("{lead}{replacement}{trail}")
}

/// Re-reads `original` from disk, injects, and writes UTF-8 output to `output`.
pub fn inject_file(
    original: &Path,
    translations: &BTreeMap<String, String>,
    output: &Path,
) -> Result<InjectReport, XmlError> {
    let doc = read_document(original)?;
    let (updated, report) = inject_translations(&doc, translations)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FileError::new("create directory", parent, e))?;
    }
    std::fs::write(output, write_document(&updated)).map_err(|e| FileError::new("write", output, e))?;

    if !report.unresolved.is_empty() {
        tracing::warn!(
            "{} address(es) no longer resolve in {} and were skipped",
            report.unresolved.len(),
            doc.name
        );
    }
    tracing::info!(
        "wrote {} ({} text node(s) replaced)",
        output.display(),
        report.modified
    );
    Ok(report)
}
