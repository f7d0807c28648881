use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::providers::ProviderConfig;

pub const CONFIG_FILENAME: &str = "xml-loc-translator.toml";
pub const CONFIG_ENV: &str = "XML_LOC_TRANSLATOR_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    /// Per-provider options keyed by provider name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderSection>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    /// gemini | openai | ollama | deepl
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub parent_tag: Option<String>,
    #[serde(default)]
    pub target_tag: Option<String>,

    #[serde(default)]
    pub target_lang: Option<String>,
    #[serde(default)]
    pub source_label: Option<String>,

    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub batch_delay_ms: Option<u64>,

    /// Checkpoint file; relative paths resolve against the input file's directory.
    #[serde(default)]
    pub checkpoint: Option<String>,
    /// Glossary JSON; relative paths resolve against the config file's directory.
    #[serde(default)]
    pub glossary: Option<String>,

    #[serde(default)]
    pub log_max_chars: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub translate: Option<String>,
    #[serde(default)]
    pub refine: Option<String>,
    #[serde(default)]
    pub batch: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ProviderSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ProviderSection {
    /// Layers these options over `base`.
    pub fn apply_to(&self, mut base: ProviderConfig) -> ProviderConfig {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        if let Some(k) = non_empty(&self.api_key) {
            base.api_key = Some(k);
        }
        if let Some(m) = non_empty(&self.model) {
            base.model = Some(m);
        }
        if let Some(e) = non_empty(&self.endpoint) {
            base.endpoint = Some(e);
        }
        if let Some(t) = self.timeout {
            base.timeout = t;
        }
        base
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}
