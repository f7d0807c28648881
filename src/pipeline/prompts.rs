use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::PromptsSection;

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_TRANSLATE: &str = "translate.txt";
pub const DEFAULT_REFINE: &str = "refine.txt";
pub const DEFAULT_BATCH: &str = "batch.txt";

/// Prompt templates for model-based providers. Placeholders use `{{name}}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSet {
    /// Single text, no glossary term applied. Vars: source_label, target_label, text.
    pub translate: String,
    /// Single text already pre-translated by the glossary. Vars: source_label, target_label, text.
    pub refine: String,
    /// Envelope of many texts. Vars: source_label, target_label, glossary, block.
    pub batch: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            translate: DEFAULT_TRANSLATE_TEXT.to_string(),
            refine: DEFAULT_REFINE_TEXT.to_string(),
            batch: DEFAULT_BATCH_TEXT.to_string(),
        }
    }
}

impl PromptSet {
    /// Explicit overrides must exist; otherwise `<config_dir>/prompts/<file>` is used when
    /// present, else the built-in text.
    pub fn load(config_dir: Option<&Path>, p: &PromptsSection) -> anyhow::Result<Self> {
        Ok(Self {
            translate: read_prompt(config_dir, p.translate.as_deref(), "translate", DEFAULT_TRANSLATE, DEFAULT_TRANSLATE_TEXT)?,
            refine: read_prompt(config_dir, p.refine.as_deref(), "refine", DEFAULT_REFINE, DEFAULT_REFINE_TEXT)?,
            batch: read_prompt(config_dir, p.batch.as_deref(), "batch", DEFAULT_BATCH, DEFAULT_BATCH_TEXT)?,
        })
    }
}

fn read_prompt(
    config_dir: Option<&Path>,
    configured: Option<&str>,
    key: &str,
    default_filename: &str,
    builtin: &str,
) -> anyhow::Result<String> {
    let base = config_dir.unwrap_or_else(|| Path::new("."));
    let path = match configured.map(str::trim).filter(|s| !s.is_empty()) {
        Some(rel) => {
            let mut p = PathBuf::from(rel);
            if p.is_relative() {
                p = base.join(&p);
            }
            if !p.exists() {
                return Err(anyhow!(
                    "prompt file not found for {key}: {} (run: xml-loc-translator --init-config)",
                    p.display()
                ));
            }
            p
        }
        None => {
            let p = base.join(DEFAULT_PROMPTS_DIR).join(default_filename);
            if config_dir.is_none() || !p.exists() {
                return Ok(builtin.to_string());
            }
            p
        }
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("read prompt: {}", path.display()))?;
    if text.trim().is_empty() {
        return Err(anyhow!("prompt file for {key} is empty: {}", path.display()));
    }
    Ok(text)
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_TRANSLATE, DEFAULT_TRANSLATE_TEXT),
        (DEFAULT_REFINE, DEFAULT_REFINE_TEXT),
        (DEFAULT_BATCH, DEFAULT_BATCH_TEXT),
    ]
}

pub const DEFAULT_TRANSLATE_TEXT: &str = r#"Act as a professional game localizer. Translate the game text below from {{source_label}} to {{target_label}} so it sounds natural in a fantasy/sci-fi setting.
- Keep designations such as 'Mk I' or 'Mk II' unchanged.
- Output ONLY the translation, without quotes or explanations.

Original text: "{{text}}"
Translation:"#;

pub const DEFAULT_REFINE_TEXT: &str = r#"Act as a professional game localizer. The text below was partially pre-translated from {{source_label}} to {{target_label}} with a fixed glossary. Fix grammar, gender, number and word order so it reads naturally in {{target_label}}.
- Keep the words that are already in {{target_label}}.
- Output ONLY the corrected text, without quotes or explanations.

Pre-translated text: "{{text}}"
Correction:"#;

pub const DEFAULT_BATCH_TEXT: &str = r#"Act as a technical translator specialized in game localization.
Below is a block of texts to translate, each one with a unique ID.
Translate the content of every item from {{source_label}} to {{target_label}}.
Your answer MUST keep EXACTLY the same [ID: ...] markers and --- separators, replacing only the {{source_label}} text with its translation.
A line that starts with a backslash (\) must keep that backslash at the start.

{{glossary}}
---BEGIN BLOCK---
{{block}}
---END BLOCK---
"#;

#[cfg(test)]
mod tests {
    use super::{render_template, PromptSet};
    use crate::config::PromptsSection;

    #[test]
    fn render_replaces_every_placeholder() {
        let out = render_template(
            "{{a}} to {{b}} ({{a}})",
            &[("a", "English"), ("b", "Portuguese (Brazil)")],
        );
        assert_eq!(out, "English to Portuguese (Brazil) (English)");
    }

    #[test]
    fn missing_prompt_dir_falls_back_to_builtins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = PromptSet::load(Some(dir.path()), &PromptsSection::default()).expect("prompts");
        assert_eq!(set, PromptSet::default());
    }

    #[test]
    fn explicit_override_is_read_and_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("mine.txt"), "Translate {{text}}").expect("write");
        let section = PromptsSection {
            translate: Some("mine.txt".to_string()),
            ..PromptsSection::default()
        };
        let set = PromptSet::load(Some(dir.path()), &section).expect("prompts");
        assert_eq!(set.translate, "Translate {{text}}");

        let section = PromptsSection {
            batch: Some("nope.txt".to_string()),
            ..PromptsSection::default()
        };
        assert!(PromptSet::load(Some(dir.path()), &section).is_err());
    }
}
