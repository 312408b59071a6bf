//! Google Gemini chat backend over SSE.
//!
//! Authentication rides in the query string (`?key=…`), not a header.
//! Content arrives as `data:`-framed JSON fragments with text nested under
//! `candidates[0].content.parts[*].text`.

use serde_json::json;

use crate::catalog::normalize_model_names;
use crate::errors::ProviderError;
use crate::provider::{ChatRequest, ChunkDelta, ProviderAdapter, ProviderId, Role, WireRequest};

use super::sse_data_payload;

const GEMINI_PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Catalog entries that are not chat models.
const EXCLUDED_MODEL_MARKERS: [&str; 5] = ["vision", "embed", "aqa", "imagen", "tts"];

/// Configuration for the Gemini API client.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// API key sent as a query parameter.
    pub api_key: String,
    /// Base URL, overridable for proxies or test servers.
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Builds a config from `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ProviderError::not_configured(
                GEMINI_PROVIDER,
                "missing GEMINI_API_KEY",
            ));
        }
        Ok(Self::new(api_key))
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url.trim_end_matches('/'),
            model,
            self.api_key,
        )
    }

    fn models_url(&self) -> String {
        format!(
            "{}/v1beta/models?key={}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
        )
    }
}

/// Provider adapter for Gemini streaming generation.
pub struct GeminiProvider {
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self::new(GeminiConfig::from_env()?))
    }

    fn check_configured(&self) -> Result<(), ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::not_configured(
                GEMINI_PROVIDER,
                "missing API key",
            ));
        }
        Ok(())
    }
}

impl ProviderAdapter for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(GEMINI_PROVIDER)
    }

    fn build_request(&self, request: &ChatRequest) -> Result<WireRequest, ProviderError> {
        self.check_configured()?;
        if request.model.trim().is_empty() {
            return Err(ProviderError::not_configured(
                GEMINI_PROVIDER,
                "no model selected",
            ));
        }
        let mut contents: Vec<serde_json::Value> = request
            .history
            .iter()
            .map(|turn| {
                json!({
                    "role": match turn.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    },
                    "parts": [{ "text": turn.text }],
                })
            })
            .collect();
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": request.prompt }],
        }));

        let mut body = json!({ "contents": contents });
        if let Some(temperature) = request.temperature {
            body["generationConfig"] = json!({ "temperature": temperature });
        }
        Ok(WireRequest::post(
            self.config.stream_url(&request.model),
            body,
        ))
    }

    fn extract_delta(&self, line: &str) -> Option<ChunkDelta> {
        let payload = sse_data_payload(line)?;
        let value: serde_json::Value = serde_json::from_str(payload).ok()?;
        if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
            return Some(ChunkDelta::text(format!("Error: {message}")));
        }
        let parts = value.pointer("/candidates/0/content/parts")?.as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|v| v.as_str()))
            .collect();
        if text.is_empty() {
            return None;
        }
        Some(ChunkDelta::text(text))
    }

    fn list_models_request(&self) -> Result<WireRequest, ProviderError> {
        self.check_configured()?;
        Ok(WireRequest::get(self.config.models_url()))
    }

    fn normalize_model_list(&self, raw: &str) -> Vec<String> {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return Vec::new();
        };
        let names = value
            .get("models")
            .and_then(|v| v.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(|v| v.as_str()))
                    .map(|name| name.strip_prefix("models/").unwrap_or(name).to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        normalize_model_names(names, &EXCLUDED_MODEL_MARKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HistoryTurn;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(GeminiConfig::new("test-key"))
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gemini-pro".into(),
            prompt: "hello".into(),
            temperature: Some(0.4),
            history: vec![HistoryTurn::user("hi"), HistoryTurn::assistant("hey")],
            context: None,
        }
    }

    #[test]
    fn key_rides_in_the_query_string_not_a_header() {
        let wire = provider().build_request(&request()).expect("wire");
        assert!(wire.url.contains("alt=sse"));
        assert!(wire.url.contains("key=test-key"));
        assert!(wire.headers.is_empty());
    }

    #[test]
    fn history_maps_to_user_and_model_roles() {
        let wire = provider().build_request(&request()).expect("wire");
        let body = wire.body.expect("body");
        let contents = body["contents"].as_array().expect("contents");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["temperature"], 0.4);
    }

    #[test]
    fn missing_key_fails_before_transport() {
        let provider = GeminiProvider::new(GeminiConfig::new(""));
        assert!(matches!(
            provider.build_request(&request()),
            Err(ProviderError::NotConfigured { .. })
        ));
        assert!(provider.list_models_request().is_err());
    }

    #[test]
    fn extract_delta_joins_candidate_parts() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        let delta = provider().extract_delta(line).expect("delta");
        assert_eq!(delta.text.as_deref(), Some("Hello"));
    }

    #[test]
    fn embedded_errors_surface_as_displayable_text() {
        let line = r#"data: {"error":{"code":429,"message":"quota exceeded"}}"#;
        let delta = provider().extract_delta(line).expect("delta");
        assert_eq!(delta.text.as_deref(), Some("Error: quota exceeded"));
    }

    #[test]
    fn malformed_and_non_data_lines_are_swallowed() {
        let p = provider();
        assert!(p.extract_delta("event: ping").is_none());
        assert!(p.extract_delta("data: not json").is_none());
        assert!(p.extract_delta(r#"data: {"candidates":[]}"#).is_none());
    }

    #[test]
    fn catalog_filters_variants_and_strips_resource_prefix() {
        let raw = r#"{"models":[
            {"name":"models/gemini-pro"},
            {"name":"models/gemini-pro-vision"},
            {"name":"models/gemini-pro-002"},
            {"name":"models/text-embedding-004"},
            {"name":"models/aqa"}
        ]}"#;
        assert_eq!(provider().normalize_model_list(raw), vec!["gemini-pro"]);
    }

    #[tokio::test]
    async fn env_gated_smoke_lists_models_if_key_present() {
        if std::env::var("GEMINI_API_KEY")
            .unwrap_or_default()
            .trim()
            .is_empty()
        {
            eprintln!("skipping Gemini smoke test (GEMINI_API_KEY missing)");
            return;
        }
        let client = crate::ChatClient::new(std::sync::Arc::new(
            GeminiProvider::from_env().expect("provider"),
        ))
        .expect("client");
        let models = client.fetch_model_names().await.expect("catalog");
        assert!(!models.is_empty(), "Gemini catalog should not be empty");
    }
}
