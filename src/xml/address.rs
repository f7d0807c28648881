use std::collections::HashMap;

use super::document::XmlDocument;

/// Stable positional addresses for every element of one parsed document.
///
/// The root is addressed as `/<root>`; every other element appends `/<tag>[i]` where `i` is its
/// 1-based position among same-tag siblings. Addresses are computed once per document.
pub struct AddressBook {
    by_element: Vec<String>,
    by_address: HashMap<String, usize>,
}

impl AddressBook {
    pub fn build(doc: &XmlDocument) -> Self {
        let mut by_element: Vec<String> = vec![String::new(); doc.len()];
        let mut by_address = HashMap::with_capacity(doc.len());
        if doc.is_empty() {
            return Self {
                by_element,
                by_address,
            };
        }

        let root = doc.root();
        by_element[root] = format!("/{}", doc.tag(root));
        by_address.insert(by_element[root].clone(), root);

        // Elements are stored in document order, so a parent's address is always ready first.
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for id in 0..doc.len() {
            seen.clear();
            for &child in &doc.element(id).children {
                let tag = doc.tag(child);
                let index = seen.entry(tag).or_insert(0);
                *index += 1;
                let addr = format!("{}/{}[{}]", by_element[id], tag, index);
                by_address.insert(addr.clone(), child);
                by_element[child] = addr;
            }
        }

        Self {
            by_element,
            by_address,
        }
    }

    pub fn address(&self, id: usize) -> &str {
        &self.by_element[id]
    }

    pub fn resolve(&self, address: &str) -> Option<usize> {
        self.by_address.get(address.trim()).copied()
    }
}
