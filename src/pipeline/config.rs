use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};

use crate::batch::engine::{BatchSettings, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE};
use crate::config::{find_default_config, load_config, AppConfig, CONFIG_ENV, CONFIG_FILENAME};
use crate::pipeline::prompts::{default_prompt_files, PromptSet, DEFAULT_PROMPTS_DIR};
use crate::providers::{api_key_env_var, ProviderConfig};
use crate::targets::{lookup, TargetLanguage};
use crate::xml::ExtractQuery;

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_GLOSSARY: &str = "glossary.json";

/// Command-line values that take precedence over the config file.
#[derive(Clone, Debug, Default)]
pub struct PipelineOverrides {
    pub config: Option<PathBuf>,
    pub provider: Option<String>,
    pub parent_tag: Option<String>,
    pub target_tag: Option<String>,
    pub target_lang: Option<String>,
    pub source_label: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Option<u64>,
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub checkpoint: Option<PathBuf>,
    pub glossary: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub workdir: PathBuf,
    /// The config file that was loaded, if any.
    pub config_path: Option<PathBuf>,

    pub provider: String,
    pub provider_cfg: ProviderConfig,
    pub target: TargetLanguage,

    pub query: ExtractQuery,
    pub batch: BatchSettings,
    pub glossary_path: PathBuf,
    pub log_max_chars: usize,

    pub prompts: PromptSet,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl PipelineConfig {
    pub fn from_input_and_args(input: &Path, args: PipelineOverrides) -> anyhow::Result<Self> {
        let workdir = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let workdir = workdir.canonicalize().unwrap_or(workdir);

        let cfg_file = args
            .config
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(&workdir, CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        let mut config_path = None;
        if let Some(p) = cfg_file {
            if p.exists() {
                file_cfg = load_config(&p)?;
                tracing::info!("config: {}", p.display());
                config_path = Some(p);
            } else if args.config.is_some() {
                return Err(anyhow!("config file not found: {}", p.display()));
            }
        }
        let config_dir = config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        let p = &file_cfg.pipeline;

        let provider = non_empty(args.provider)
            .or_else(|| non_empty(p.provider.clone()))
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
            .to_ascii_lowercase();

        let target_tag = non_empty(args.target_tag)
            .or_else(|| non_empty(p.target_tag.clone()))
            .ok_or_else(|| anyhow!("no target tag: pass --target-tag or set pipeline.target_tag"))?;
        let parent_tag = non_empty(args.parent_tag).or_else(|| non_empty(p.parent_tag.clone()));
        let query = ExtractQuery::new(parent_tag.as_deref(), &target_tag);

        let target_code = non_empty(args.target_lang)
            .or_else(|| non_empty(p.target_lang.clone()))
            .unwrap_or_else(|| "pt".to_string());
        let target = lookup(&target_code);

        let mut provider_cfg = ProviderConfig::default().for_target(&target_code);
        if let Some(label) = non_empty(args.source_label).or_else(|| non_empty(p.source_label.clone())) {
            provider_cfg.source_label = label;
        }
        if let Some(section) = file_cfg.providers.get(&provider) {
            provider_cfg = section.apply_to(provider_cfg);
        }
        if let Some(key) = non_empty(std::env::var(api_key_env_var(&provider)).ok()) {
            provider_cfg.api_key = Some(key);
        }
        if let Some(key) = non_empty(args.api_key) {
            provider_cfg.api_key = Some(key);
        }
        if let Some(model) = non_empty(args.model) {
            provider_cfg.model = Some(model);
        }
        if let Some(endpoint) = non_empty(args.endpoint) {
            provider_cfg.endpoint = Some(endpoint);
        }
        if let Some(timeout) = args.timeout {
            provider_cfg.timeout = timeout;
        }

        let checkpoint_path = match args.checkpoint {
            Some(c) => c,
            None => match non_empty(p.checkpoint.clone()) {
                Some(c) => resolve_against(&workdir, PathBuf::from(c)),
                None => default_checkpoint_for(input),
            },
        };
        let glossary_base = config_dir.clone().unwrap_or_else(|| workdir.clone());
        let glossary_path = match args.glossary {
            Some(g) => g,
            None => resolve_against(
                &glossary_base,
                PathBuf::from(non_empty(p.glossary.clone()).unwrap_or_else(|| DEFAULT_GLOSSARY.to_string())),
            ),
        };

        let log_max_chars = p.log_max_chars.unwrap_or(240);
        let batch = BatchSettings {
            batch_size: args.batch_size.or(p.batch_size).unwrap_or(DEFAULT_BATCH_SIZE).max(1),
            delay: args
                .batch_delay_ms
                .or(p.batch_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_BATCH_DELAY),
            checkpoint_path,
            log_max_chars,
        };

        let prompts = PromptSet::load(config_dir.as_deref(), &file_cfg.prompts).context("load prompts")?;

        Ok(Self {
            workdir,
            config_path,
            provider,
            provider_cfg,
            target,
            query,
            batch,
            glossary_path,
            log_max_chars,
            prompts,
        })
    }
}

fn resolve_against(base: &Path, p: PathBuf) -> PathBuf {
    if p.is_relative() {
        base.join(p)
    } else {
        p
    }
}

/// `<dir>/<stem>.checkpoint.json` next to the input.
pub fn default_checkpoint_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("translation");
    input.with_file_name(format!("{stem}.checkpoint.json"))
}

/// `<dir>/<stem>_translated.xml` next to the input.
pub fn default_output_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}_translated.xml"))
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;

    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    let glossary_path = dir.join(DEFAULT_GLOSSARY);
    if !glossary_path.exists() || force {
        std::fs::write(&glossary_path, DEFAULT_GLOSSARY_JSON)
            .with_context(|| format!("write glossary: {}", glossary_path.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_GLOSSARY_JSON: &str = r#"{
  "pt": {
    "Kinetic Blade": "Lâmina Cinética",
    "Blade": "Lâmina"
  }
}
"#;

const DEFAULT_CONFIG_TOML: &str = r#"[pipeline]
# gemini | openai | ollama | deepl
provider = "gemini"

# Elements to translate: every <target_tag> that is a direct child of a <parent_tag>.
# Leave parent_tag out to take <target_tag> anywhere in the document.
# parent_tag = "item"
target_tag = "name"

target_lang = "pt"
source_label = "English"

batch_size = 120
batch_delay_ms = 5000
# checkpoint = "translation.checkpoint.json"
glossary = "glossary.json"
log_max_chars = 240

[prompts]
translate = "prompts/translate.txt"
refine = "prompts/refine.txt"
batch = "prompts/batch.txt"

# API keys may also come from GEMINI_API_KEY / OPENAI_API_KEY / DEEPL_API_KEY.
[providers.gemini]
model = "gemini-1.5-flash-latest"

[providers.openai]
model = "gpt-4o-mini"
# endpoint = "https://api.openai.com/v1"

[providers.ollama]
model = "llama3"
endpoint = "http://localhost:11434"
timeout = 300

[providers.deepl]
# api_key = "...:fx"
"#;

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{default_checkpoint_for, default_output_for, init_default_config, PipelineConfig, PipelineOverrides};

    #[test]
    fn default_paths_sit_next_to_input() {
        let input = Path::new("/data/items.xml");
        assert_eq!(default_output_for(input), Path::new("/data/items_translated.xml"));
        assert_eq!(default_checkpoint_for(input), Path::new("/data/items.checkpoint.json"));
    }

    #[test]
    fn init_config_then_resolve_with_cli_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = init_default_config(dir.path(), false).expect("init");
        assert!(dir.path().join("prompts").join("batch.txt").exists());
        assert!(dir.path().join("glossary.json").exists());

        let input = dir.path().join("items.xml");
        let cfg = PipelineConfig::from_input_and_args(
            &input,
            PipelineOverrides {
                config: Some(cfg_path.clone()),
                provider: Some("Ollama".to_string()),
                target_lang: Some("es".to_string()),
                batch_size: Some(0),
                ..PipelineOverrides::default()
            },
        )
        .expect("config");
        assert_eq!(cfg.config_path.as_deref(), Some(cfg_path.as_path()));
        assert_eq!(cfg.provider, "ollama");
        assert_eq!(cfg.query.target_tag, "name");
        assert_eq!(cfg.query.parent_tag, None);
        assert_eq!(cfg.provider_cfg.model.as_deref(), Some("llama3"));
        assert_eq!(cfg.provider_cfg.timeout, 300);
        assert_eq!(cfg.provider_cfg.deepl_lang, "ES");
        assert_eq!(cfg.target.label, "Spanish");
        assert_eq!(cfg.batch.batch_size, 1);
        assert_eq!(cfg.glossary_path, dir.path().join("glossary.json"));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = PipelineConfig::from_input_and_args(
            &dir.path().join("items.xml"),
            PipelineOverrides {
                config: Some(dir.path().join("nope.toml")),
                target_tag: Some("name".to_string()),
                ..PipelineOverrides::default()
            },
        )
        .expect_err("missing config");
        assert!(err.to_string().contains("config file not found"));
    }
}
