use serde::{Deserialize, Serialize};

use crate::batch::envelope::encode_pairs;
use crate::error::ProviderError;
use crate::ir::TextEntry;

use super::http::{build_client, join_url, send_json};
use super::{ProviderConfig, TranslationProvider};

const NAME: &str = "deepl";
const FREE_ENDPOINT: &str = "https://api-free.deepl.com";
const PRO_ENDPOINT: &str = "https://api.deepl.com";

#[derive(Serialize)]
struct DeepLRequest<'a> {
    text: Vec<&'a str>,
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct DeepLResponse {
    #[serde(default)]
    translations: Vec<DeepLTranslation>,
}

#[derive(Deserialize)]
struct DeepLTranslation {
    text: String,
}

/// DeepL text translation. It takes many texts per request, so a batch is sent as-is and the
/// answers are put back into the envelope.
#[derive(Default)]
pub struct DeepLProvider;

impl DeepLProvider {
    pub fn new() -> Self {
        Self
    }

    fn endpoint(cfg: &ProviderConfig, key: &str) -> String {
        let base = match cfg.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            Some(custom) => custom,
            // Free-plan keys end in ":fx".
            None if key.ends_with(":fx") => FREE_ENDPOINT,
            None => PRO_ENDPOINT,
        };
        join_url(base, "v2/translate")
    }

    fn translate_many(&self, texts: &[&str], cfg: &ProviderConfig) -> Result<Vec<String>, ProviderError> {
        let key = cfg.require_api_key(NAME)?;
        let url = Self::endpoint(cfg, key);
        let client = build_client(NAME, cfg.timeout)?;
        let body = DeepLRequest {
            text: texts.to_vec(),
            target_lang: cfg.deepl_lang.as_str(),
        };
        let req = client
            .post(&url)
            .header("Authorization", format!("DeepL-Auth-Key {key}"))
            .json(&body);
        let resp: DeepLResponse = send_json(NAME, &url, "Check the network connection.", req)?;

        if resp.translations.len() != texts.len() {
            return Err(ProviderError::MalformedResponse {
                provider: NAME.to_string(),
                detail: format!(
                    "sent {} text(s) but received {} translation(s)",
                    texts.len(),
                    resp.translations.len()
                ),
            });
        }
        Ok(resp.translations.into_iter().map(|t| t.text).collect())
    }
}

impl TranslationProvider for DeepLProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn translate(&self, text: &str, cfg: &ProviderConfig) -> Result<String, ProviderError> {
        let out = self
            .translate_many(&[text], cfg)?
            .into_iter()
            .next()
            .unwrap_or_default();
        if out.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: NAME.to_string(),
            });
        }
        Ok(out.trim().to_string())
    }

    fn translate_block(&self, batch: &[TextEntry], cfg: &ProviderConfig) -> Result<String, ProviderError> {
        let texts: Vec<&str> = batch.iter().map(|e| e.text.as_str()).collect();
        let translated = self.translate_many(&texts, cfg)?;
        Ok(encode_pairs(
            batch
                .iter()
                .zip(translated.iter())
                .map(|(e, t)| (e.address.as_str(), t.trim())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::DeepLProvider;
    use crate::batch::envelope::reconcile;
    use crate::error::ProviderError;
    use crate::ir::TextEntry;
    use crate::providers::{ProviderConfig, TranslationProvider};

    fn serve(rt: &Runtime, body: serde_json::Value) -> MockServer {
        rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v2/translate"))
                .and(header("authorization", "DeepL-Auth-Key test-key"))
                .and(body_partial_json(json!({"target_lang": "PT-BR"})))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&server)
                .await;
            server
        })
    }

    fn cfg_for(server: &MockServer) -> ProviderConfig {
        ProviderConfig {
            api_key: Some("test-key".to_string()),
            endpoint: Some(server.uri()),
            timeout: 5,
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn free_keys_use_free_endpoint() {
        let cfg = ProviderConfig::default();
        assert_eq!(
            DeepLProvider::endpoint(&cfg, "abc:fx"),
            "https://api-free.deepl.com/v2/translate"
        );
        assert_eq!(
            DeepLProvider::endpoint(&cfg, "abc"),
            "https://api.deepl.com/v2/translate"
        );
        let custom = ProviderConfig {
            endpoint: Some("http://localhost:8080/".to_string()),
            ..ProviderConfig::default()
        };
        assert_eq!(
            DeepLProvider::endpoint(&custom, "abc"),
            "http://localhost:8080/v2/translate"
        );
    }

    #[test]
    fn block_answers_are_put_back_into_the_envelope() {
        let rt = Runtime::new().expect("runtime");
        let server = serve(
            &rt,
            json!({"translations": [
                {"detected_source_language": "EN", "text": "Escudo"},
                {"detected_source_language": "EN", "text": "Linha um\n---\nLinha dois"}
            ]}),
        );
        let batch = vec![
            TextEntry::new("/r/a[1]", "Shield"),
            TextEntry::new("/r/a[2]", "Line one\n---\nLine two"),
        ];
        let reply = DeepLProvider::new()
            .translate_block(&batch, &cfg_for(&server))
            .expect("translate block");
        let parsed = reconcile(&batch, &reply);
        assert!(parsed.missing.is_empty());
        assert_eq!(parsed.translated[0].1, "Escudo");
        assert_eq!(parsed.translated[1].1, "Linha um\n---\nLinha dois");
    }

    #[test]
    fn count_mismatch_is_malformed() {
        let rt = Runtime::new().expect("runtime");
        let server = serve(&rt, json!({"translations": []}));
        let err = DeepLProvider::new()
            .translate("Shield", &cfg_for(&server))
            .expect_err("mismatch");
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }
}
