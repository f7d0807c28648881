use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::batch::envelope::encode_batch;
use crate::error::ProviderError;
use crate::glossary::Glossary;
use crate::ir::TextEntry;
use crate::pipeline::prompts::{render_template, PromptSet};
use crate::textutil::cleanup_model_text;

use super::http::{build_client, join_url, send_json};
use super::{ProviderConfig, TranslationProvider};

const MAX_PROMPT_TERMS: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatApi {
    Gemini,
    OpenAi,
    Ollama,
}

impl ChatApi {
    pub fn name(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash-latest",
            Self::OpenAi => "gpt-4o-mini",
            Self::Ollama => "llama3",
        }
    }

    fn default_endpoint(self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }

    fn unreachable_hint(self) -> &'static str {
        match self {
            Self::Ollama => "Is the local Ollama server running? Start it with `ollama serve`.",
            Self::Gemini | Self::OpenAi => "Check the network connection and the configured endpoint.",
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPartOut<'a>>,
}

#[derive(Serialize)]
struct GeminiPartOut<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPartIn>,
}

#[derive(Deserialize)]
struct GeminiPartIn {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageOut<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessageOut<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageIn,
}

#[derive(Deserialize)]
struct ChatMessageIn {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

/// A model-based backend driven by prompts: the glossary pre-translates known terms and the
/// model fixes up (or freshly translates) the rest.
pub struct ChatProvider {
    api: ChatApi,
    glossary: Arc<Glossary>,
    prompts: Arc<PromptSet>,
}

impl ChatProvider {
    pub fn new(api: ChatApi, glossary: Arc<Glossary>, prompts: Arc<PromptSet>) -> Self {
        Self {
            api,
            glossary,
            prompts,
        }
    }

    /// Prompt for one text, after glossary substitution.
    pub fn single_prompt(&self, text: &str, cfg: &ProviderConfig) -> String {
        let outcome = self.glossary.apply(text);
        let template = if outcome.used {
            &self.prompts.refine
        } else {
            &self.prompts.translate
        };
        render_template(
            template,
            &[
                ("source_label", cfg.source_label.as_str()),
                ("target_label", cfg.target_label.as_str()),
                ("text", outcome.text.as_str()),
            ],
        )
    }

    pub fn batch_prompt(&self, batch: &[TextEntry], cfg: &ProviderConfig) -> String {
        let joined = batch
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let terms = self.glossary.relevant_for_text(&joined, MAX_PROMPT_TERMS);
        let glossary = Glossary::render_for_prompt(&terms);
        let block = encode_batch(batch);
        render_template(
            &self.prompts.batch,
            &[
                ("source_label", cfg.source_label.as_str()),
                ("target_label", cfg.target_label.as_str()),
                ("glossary", glossary.as_str()),
                ("block", block.as_str()),
            ],
        )
    }

    fn model<'a>(&self, cfg: &'a ProviderConfig) -> &'a str {
        let model = cfg
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.api.default_model());
        // Gemini model listings include a `models/` prefix that the URL already carries.
        model.strip_prefix("models/").unwrap_or(model)
    }

    fn complete(&self, prompt: &str, cfg: &ProviderConfig) -> Result<String, ProviderError> {
        let name = self.api.name();
        let base = cfg
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(self.api.default_endpoint());
        let hint = self.api.unreachable_hint();
        let client = build_client(name, cfg.timeout)?;
        let model = self.model(cfg);

        let text = match self.api {
            ChatApi::Gemini => {
                let key = cfg.require_api_key(name)?;
                let url = join_url(base, &format!("v1beta/models/{model}:generateContent"));
                let body = GeminiRequest {
                    contents: vec![GeminiContent {
                        parts: vec![GeminiPartOut { text: prompt }],
                    }],
                };
                let resp: GeminiResponse =
                    send_json(name, &url, hint, client.post(&url).query(&[("key", key)]).json(&body))?;
                resp.candidates
                    .into_iter()
                    .filter_map(|c| c.content)
                    .flat_map(|c| c.parts)
                    .map(|p| p.text)
                    .collect::<String>()
            }
            ChatApi::OpenAi => {
                let key = cfg.require_api_key(name)?;
                let url = join_url(base, "chat/completions");
                let body = ChatRequest {
                    model,
                    messages: vec![ChatMessageOut {
                        role: "user",
                        content: prompt,
                    }],
                    temperature: 0.3,
                };
                let resp: ChatResponse =
                    send_json(name, &url, hint, client.post(&url).bearer_auth(key).json(&body))?;
                resp.choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default()
            }
            ChatApi::Ollama => {
                let url = join_url(base, "api/generate");
                let body = OllamaRequest {
                    model,
                    prompt,
                    stream: false,
                };
                let resp: OllamaResponse = send_json(name, &url, hint, client.post(&url).json(&body))?;
                resp.response
            }
        };

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: name.to_string(),
            });
        }
        Ok(text)
    }
}

impl TranslationProvider for ChatProvider {
    fn name(&self) -> &str {
        self.api.name()
    }

    fn translate(&self, text: &str, cfg: &ProviderConfig) -> Result<String, ProviderError> {
        let prompt = self.single_prompt(text, cfg);
        let out = cleanup_model_text(&self.complete(&prompt, cfg)?);
        if out.is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: self.api.name().to_string(),
            });
        }
        Ok(out)
    }

    fn translate_block(&self, batch: &[TextEntry], cfg: &ProviderConfig) -> Result<String, ProviderError> {
        let prompt = self.batch_prompt(batch, cfg);
        self.complete(&prompt, cfg)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ChatApi, ChatProvider};
    use crate::error::ProviderError;
    use crate::glossary::Glossary;
    use crate::ir::TextEntry;
    use crate::pipeline::prompts::PromptSet;
    use crate::providers::{ProviderConfig, TranslationProvider};

    fn provider(api: ChatApi) -> ChatProvider {
        let glossary = Glossary::new([
            ("Blade".to_string(), "Lâmina".to_string()),
            ("Kinetic Blade".to_string(), "Lâmina Cinética".to_string()),
        ]);
        ChatProvider::new(api, Arc::new(glossary), Arc::new(PromptSet::default()))
    }

    #[test]
    fn glossary_hit_selects_refine_prompt() {
        let p = provider(ChatApi::Gemini);
        let cfg = ProviderConfig::default();
        let refine = p.single_prompt("Kinetic Blade Mk II", &cfg);
        assert!(refine.contains("Pre-translated text: \"Lâmina Cinética Mk II\""));
        assert!(refine.contains("Portuguese (Brazil)"));

        let fresh = p.single_prompt("Plasma Rifle", &cfg);
        assert!(fresh.contains("Original text: \"Plasma Rifle\""));
    }

    #[test]
    fn batch_prompt_embeds_envelope_and_terms() {
        let p = provider(ChatApi::OpenAi);
        let batch = vec![
            TextEntry::new("/items/item[1]/name[1]", "Kinetic Blade"),
            TextEntry::new("/items/item[2]/name[1]", "Shield"),
        ];
        let prompt = p.batch_prompt(&batch, &ProviderConfig::default());
        assert!(prompt.contains("[ID: /items/item[1]/name[1]]\nKinetic Blade\n---\n"));
        assert!(prompt.contains("- Kinetic Blade => Lâmina Cinética"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn hosted_apis_need_a_key_before_any_request() {
        let p = provider(ChatApi::Gemini);
        let err = p
            .translate("Shield", &ProviderConfig::default())
            .expect_err("no key");
        assert!(matches!(err, ProviderError::MissingApiKey { .. }));
    }

    #[test]
    fn model_prefix_is_stripped() {
        let p = provider(ChatApi::Gemini);
        let cfg = ProviderConfig {
            model: Some("models/gemini-1.5-pro".to_string()),
            ..ProviderConfig::default()
        };
        assert_eq!(p.model(&cfg), "gemini-1.5-pro");
        assert_eq!(p.model(&ProviderConfig::default()), "gemini-1.5-flash-latest");
    }

    /// The server runs on the runtime's workers while the blocking client calls it from here.
    fn serve(rt: &Runtime, mock: Mock) -> MockServer {
        rt.block_on(async {
            let server = MockServer::start().await;
            mock.mount(&server).await;
            server
        })
    }

    fn cfg_for(server: &MockServer) -> ProviderConfig {
        ProviderConfig {
            api_key: Some("test-key".to_string()),
            model: Some("test-model".to_string()),
            endpoint: Some(server.uri()),
            timeout: 5,
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn gemini_candidates_are_joined_and_cleaned() {
        let rt = Runtime::new().expect("runtime");
        let server = serve(
            &rt,
            Mock::given(method("POST"))
                .and(path("/v1beta/models/test-model:generateContent"))
                .and(query_param("key", "test-key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "candidates": [{"content": {"parts": [{"text": "Translation: \"Escudo"}, {"text": " de Energia\""}]}}]
                }))),
        );
        let out = provider(ChatApi::Gemini)
            .translate("Energy Shield", &cfg_for(&server))
            .expect("translate");
        assert_eq!(out, "Escudo de Energia");
    }

    #[test]
    fn openai_block_reply_is_returned_raw() {
        let rt = Runtime::new().expect("runtime");
        let reply = "[ID: /a[1]]\nEscudo\n---\n";
        let server = serve(
            &rt,
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .and(header("authorization", "Bearer test-key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{"message": {"role": "assistant", "content": reply}}]
                }))),
        );
        let got = provider(ChatApi::OpenAi)
            .translate_block(&[TextEntry::new("/a[1]", "Shield")], &cfg_for(&server))
            .expect("translate block");
        assert_eq!(got, reply);
    }

    #[test]
    fn ollama_needs_no_key_and_reads_response_field() {
        let rt = Runtime::new().expect("runtime");
        let server = serve(
            &rt,
            Mock::given(method("POST"))
                .and(path("/api/generate"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "model": "test-model",
                    "response": "```\nLâmina\n```",
                    "done": true
                }))),
        );
        let cfg = ProviderConfig {
            api_key: None,
            ..cfg_for(&server)
        };
        let out = provider(ChatApi::Ollama).translate("Blade", &cfg).expect("translate");
        assert_eq!(out, "Lâmina");
    }

    #[test]
    fn error_status_and_empty_answers_are_reported() {
        let rt = Runtime::new().expect("runtime");
        let server = serve(
            &rt,
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .respond_with(ResponseTemplate::new(429).set_body_string("slow down")),
        );
        let err = provider(ChatApi::OpenAi)
            .translate("Shield", &cfg_for(&server))
            .expect_err("rate limited");
        assert!(matches!(err, ProviderError::Status { status: 429, ref body, .. } if body == "slow down"));

        let server = serve(
            &rt,
            Mock::given(method("POST"))
                .and(path("/v1beta/models/test-model:generateContent"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []}))),
        );
        let err = provider(ChatApi::Gemini)
            .translate("Shield", &cfg_for(&server))
            .expect_err("empty");
        assert!(matches!(err, ProviderError::EmptyResponse { .. }));
    }
}
