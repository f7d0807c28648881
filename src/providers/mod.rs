//! Interchangeable translation backends behind one capability.
//!
//! Every backend implements [`TranslationProvider`]; call sites pick one by name through a
//! [`ProviderRegistry`], which also turns backend-specific failures into a single
//! [`ProviderFailure`].

pub mod chat;
pub mod deepl;
pub mod http;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderFailure};
use crate::glossary::Glossary;
use crate::ir::TextEntry;
use crate::pipeline::prompts::PromptSet;

pub use chat::{ChatApi, ChatProvider};
pub use deepl::DeepLProvider;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Options a provider may read; each backend ignores what it does not use.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub target_lang: String,
    pub target_label: String,
    pub source_label: String,
    pub deepl_lang: String,
    /// Seconds.
    pub timeout: u64,
    /// Base URL override (self-hosted or compatible servers).
    pub endpoint: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            target_lang: "pt".to_string(),
            target_label: "Portuguese (Brazil)".to_string(),
            source_label: "English".to_string(),
            deepl_lang: "PT-BR".to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            endpoint: None,
        }
    }
}

impl ProviderConfig {
    /// Fills the language fields from the target table.
    #[must_use]
    pub fn for_target(mut self, code: &str) -> Self {
        let lang = crate::targets::lookup(code);
        self.target_lang = lang.code;
        self.deepl_lang = lang.deepl;
        self.target_label = lang.label;
        self
    }

    pub(crate) fn require_api_key(&self, provider: &str) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::MissingApiKey {
                provider: provider.to_string(),
                env_var: api_key_env_var(provider),
            })
    }
}

/// `GEMINI_API_KEY`, `OPENAI_API_KEY`, ...
pub fn api_key_env_var(provider: &str) -> String {
    format!("{}_API_KEY", provider.trim().to_ascii_uppercase())
}

pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Translates one text.
    fn translate(&self, text: &str, cfg: &ProviderConfig) -> Result<String, ProviderError>;

    /// Translates a whole batch in one call. The reply must use the `[ID: ...]` envelope so
    /// the batch engine can parse it.
    fn translate_block(&self, batch: &[TextEntry], cfg: &ProviderConfig) -> Result<String, ProviderError>;
}

/// Name → provider. Names are matched case-insensitively.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn TranslationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in backends: gemini, openai, ollama, deepl.
    pub fn with_defaults(glossary: Arc<Glossary>, prompts: Arc<PromptSet>) -> Self {
        let mut reg = Self::new();
        for api in [ChatApi::Gemini, ChatApi::OpenAi, ChatApi::Ollama] {
            reg.register(Arc::new(ChatProvider::new(api, glossary.clone(), prompts.clone())));
        }
        reg.register(Arc::new(DeepLProvider::new()));
        reg
    }

    pub fn register(&mut self, provider: Arc<dyn TranslationProvider>) {
        self.providers
            .insert(provider.name().to_ascii_lowercase(), provider);
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn TranslationProvider>, ProviderFailure> {
        let key = name.trim().to_ascii_lowercase();
        self.providers.get(&key).cloned().ok_or_else(|| {
            ProviderFailure::from_error(&key, &ProviderError::UnknownProvider(name.to_string()))
        })
    }

    /// Single-text translation with failures normalized.
    pub fn translate(&self, name: &str, text: &str, cfg: &ProviderConfig) -> Result<String, ProviderFailure> {
        let provider = self.get(name)?;
        provider
            .translate(text, cfg)
            .map_err(|e| ProviderFailure::from_error(provider.name(), &e))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ProviderConfig, ProviderRegistry, TranslationProvider};
    use crate::error::ProviderError;
    use crate::glossary::Glossary;
    use crate::ir::TextEntry;
    use crate::pipeline::prompts::PromptSet;

    struct Refusing;

    impl TranslationProvider for Refusing {
        fn name(&self) -> &str {
            "Local"
        }

        fn translate(&self, _text: &str, _cfg: &ProviderConfig) -> Result<String, ProviderError> {
            Err(ProviderError::ConnectionRefused {
                provider: "local".to_string(),
                endpoint: "http://localhost:1".to_string(),
                hint: "start the server".to_string(),
            })
        }

        fn translate_block(&self, _batch: &[TextEntry], _cfg: &ProviderConfig) -> Result<String, ProviderError> {
            Ok(String::new())
        }
    }

    #[test]
    fn config_defaults_and_unknown_keys() {
        let cfg: ProviderConfig = toml::from_str("model = \"m\"\ncolour = \"blue\"").expect("config");
        assert_eq!(cfg.model.as_deref(), Some("m"));
        assert_eq!(cfg.target_lang, "pt");
        assert_eq!(cfg.target_label, "Portuguese (Brazil)");
        assert_eq!(cfg.timeout, 120);

        let es = ProviderConfig::default().for_target("es");
        assert_eq!(es.deepl_lang, "ES");
        assert_eq!(es.target_label, "Spanish");
    }

    #[test]
    fn registry_normalizes_failures() {
        let mut reg = ProviderRegistry::new();
        reg.register(Arc::new(Refusing));
        let err = reg
            .translate("LOCAL", "hi", &ProviderConfig::default())
            .expect_err("refused");
        assert!(err.connection_refused);
        assert!(err.message.contains("start the server"));

        let err = reg
            .translate("nope", "hi", &ProviderConfig::default())
            .expect_err("unknown");
        assert!(!err.connection_refused);
        assert!(err.message.contains("unknown translation provider"));
    }

    #[test]
    fn defaults_cover_all_backends() {
        let reg = ProviderRegistry::with_defaults(Arc::new(Glossary::default()), Arc::new(PromptSet::default()));
        assert_eq!(reg.names(), vec!["deepl", "gemini", "ollama", "openai"]);
    }

    #[test]
    fn missing_key_names_env_var() {
        let err = ProviderConfig::default()
            .require_api_key("gemini")
            .expect_err("no key");
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
