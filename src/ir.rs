use serde::{Deserialize, Serialize};

/// One translatable text node: its stable address and trimmed source text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEntry {
    pub address: String,
    pub text: String,
}

impl TextEntry {
    pub fn new(address: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Untranslated,
    Translating,
    Translated,
}
