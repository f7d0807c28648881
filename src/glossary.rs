use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlossaryTerm {
    pub src: String,
    pub tgt: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlossaryOutcome {
    pub text: String,
    /// At least one term was substituted.
    pub used: bool,
}

/// Source term → fixed target term, kept longest-source-first.
#[derive(Clone, Debug, Default)]
pub struct Glossary {
    terms: Vec<GlossaryTerm>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GlossaryValue {
    Term(String),
    Language(BTreeMap<String, String>),
}

impl Glossary {
    #[must_use]
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut terms: Vec<GlossaryTerm> = pairs
            .into_iter()
            .filter_map(|(src, tgt)| {
                let src = src.trim();
                let tgt = tgt.trim();
                if src.is_empty() || tgt.is_empty() {
                    return None;
                }
                Some(GlossaryTerm {
                    src: src.to_string(),
                    tgt: tgt.to_string(),
                })
            })
            .collect();
        terms.sort_by(|a, b| {
            b.src
                .chars()
                .count()
                .cmp(&a.src.chars().count())
                .then_with(|| a.src.cmp(&b.src))
        });
        terms.dedup_by(|b, a| a.src == b.src);
        Self { terms }
    }

    /// Parses a glossary file body. String values apply to every language; an object value
    /// keyed by a language code overrides terms for that target.
    pub fn from_json_str(text: &str, target_lang: &str) -> anyhow::Result<Self> {
        let raw: BTreeMap<String, GlossaryValue> =
            serde_json::from_str(text.trim_start_matches('\u{feff}')).context("parse glossary JSON")?;
        let lang = crate::targets::base_code(target_lang);

        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        let mut section: Option<BTreeMap<String, String>> = None;
        for (key, value) in raw {
            match value {
                GlossaryValue::Term(tgt) => {
                    merged.insert(key, tgt);
                }
                GlossaryValue::Language(terms) => {
                    if crate::targets::base_code(&key) == lang {
                        section = Some(terms);
                    }
                }
            }
        }
        if let Some(terms) = section {
            merged.extend(terms);
        }
        Ok(Self::new(merged))
    }

    pub fn from_json_path(path: &Path, target_lang: &str) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("glossary {} not found; continuing without one", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read glossary {}", path.display()))?;
        let glossary = Self::from_json_str(&text, target_lang)
            .with_context(|| format!("load glossary {}", path.display()))?;
        tracing::info!("glossary loaded: {} term(s) from {}", glossary.len(), path.display());
        Ok(glossary)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Literal substitution, longest source term first, over a working copy.
    #[must_use]
    pub fn apply(&self, text: &str) -> GlossaryOutcome {
        let mut out = text.to_string();
        let mut used = false;
        for t in &self.terms {
            if out.contains(&t.src) {
                out = out.replace(&t.src, &t.tgt);
                used = true;
            }
        }
        GlossaryOutcome { text: out, used }
    }

    #[must_use]
    pub fn relevant_for_text<'a>(&'a self, text: &str, max_items: usize) -> Vec<&'a GlossaryTerm> {
        if self.terms.is_empty() || text.is_empty() || max_items == 0 {
            return Vec::new();
        }
        self.terms
            .iter()
            .filter(|t| text.contains(&t.src))
            .take(max_items)
            .collect()
    }

    #[must_use]
    pub fn render_for_prompt(terms: &[&GlossaryTerm]) -> String {
        if terms.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        out.push_str("GLOSSARY (always use these translations):\n");
        for t in terms {
            out.push_str("- ");
            out.push_str(&t.src);
            out.push_str(" => ");
            out.push_str(&t.tgt);
            out.push('\n');
        }
        out
    }
}
