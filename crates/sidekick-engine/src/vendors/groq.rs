//! Groq chat backend, OpenAI-compatible chat completions over SSE with
//! bearer-token auth. Fragments arrive under `choices[0].delta.content`;
//! the stream ends with a `data: [DONE]` sentinel.

use serde_json::json;

use crate::catalog::normalize_model_names;
use crate::errors::ProviderError;
use crate::provider::{ChatRequest, ChunkDelta, ProviderAdapter, ProviderId, Role, WireRequest};

use super::sse_data_payload;

const GROQ_PROVIDER: &str = "groq";
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai";

/// Catalog entries that are not chat models.
const EXCLUDED_MODEL_MARKERS: [&str; 5] = ["whisper", "embed", "guard", "tts", "vision"];

/// Configuration for the Groq API client.
#[derive(Clone, Debug)]
pub struct GroqConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL, overridable for proxies or test servers.
    pub base_url: String,
}

impl GroqConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Builds a config from `GROQ_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("GROQ_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ProviderError::not_configured(
                GROQ_PROVIDER,
                "missing GROQ_API_KEY",
            ));
        }
        Ok(Self::new(api_key))
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn models_url(&self) -> String {
        format!("{}/v1/models", self.base_url.trim_end_matches('/'))
    }
}

/// Provider adapter for Groq chat completions (streaming).
pub struct GroqProvider {
    config: GroqConfig,
}

impl GroqProvider {
    pub fn new(config: GroqConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Ok(Self::new(GroqConfig::from_env()?))
    }

    fn check_configured(&self) -> Result<(), ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::not_configured(
                GROQ_PROVIDER,
                "missing API key",
            ));
        }
        Ok(())
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.api_key)
    }
}

impl ProviderAdapter for GroqProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(GROQ_PROVIDER)
    }

    fn build_request(&self, request: &ChatRequest) -> Result<WireRequest, ProviderError> {
        self.check_configured()?;
        if request.model.trim().is_empty() {
            return Err(ProviderError::not_configured(
                GROQ_PROVIDER,
                "no model selected",
            ));
        }
        let mut messages: Vec<serde_json::Value> = request
            .history
            .iter()
            .map(|turn| {
                json!({
                    "role": match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": turn.text,
                })
            })
            .collect();
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        Ok(WireRequest::post(self.config.chat_url(), body)
            .header("Authorization", self.bearer()))
    }

    fn extract_delta(&self, line: &str) -> Option<ChunkDelta> {
        let payload = sse_data_payload(line)?;
        let value: serde_json::Value = serde_json::from_str(payload).ok()?;
        if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
            return Some(ChunkDelta::text(format!("Error: {message}")));
        }
        let text = value
            .pointer("/choices/0/delta/content")
            .and_then(|v| v.as_str())?;
        if text.is_empty() {
            return None;
        }
        Some(ChunkDelta::text(text))
    }

    fn list_models_request(&self) -> Result<WireRequest, ProviderError> {
        self.check_configured()?;
        Ok(WireRequest::get(self.config.models_url()).header("Authorization", self.bearer()))
    }

    fn normalize_model_list(&self, raw: &str) -> Vec<String> {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return Vec::new();
        };
        let names = value
            .get("data")
            .and_then(|v| v.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("id").and_then(|v| v.as_str()))
                    .map(str::to_string)
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

    fn provider() -> GroqProvider {
        GroqProvider::new(GroqConfig::new("gsk-test"))
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "llama-3.3-70b".into(),
            prompt: "hello".into(),
            temperature: None,
            history: vec![HistoryTurn::user("hi"), HistoryTurn::assistant("hey")],
            context: None,
        }
    }

    #[test]
    fn request_carries_bearer_auth_and_history() {
        let wire = provider().build_request(&request()).expect("wire");
        assert_eq!(
            wire.headers,
            vec![("Authorization".to_string(), "Bearer gsk-test".to_string())]
        );
        let body = wire.body.expect("body");
        assert_eq!(body["stream"], true);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"], "hello");
    }

    #[test]
    fn missing_key_fails_before_transport() {
        let provider = GroqProvider::new(GroqConfig::new("  "));
        assert!(matches!(
            provider.build_request(&request()),
            Err(ProviderError::NotConfigured { .. })
        ));
        assert!(provider.list_models_request().is_err());
    }

    #[test]
    fn extract_delta_reads_choice_delta_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        let delta = provider().extract_delta(line).expect("delta");
        assert_eq!(delta.text.as_deref(), Some("Hi"));
    }

    #[test]
    fn done_sentinel_and_role_only_deltas_are_swallowed() {
        let p = provider();
        assert!(p.extract_delta("data: [DONE]").is_none());
        assert!(
            p.extract_delta(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#)
                .is_none()
        );
    }

    #[test]
    fn embedded_errors_surface_as_displayable_text() {
        let line = r#"data: {"error":{"message":"rate limit reached","type":"requests"}}"#;
        let delta = provider().extract_delta(line).expect("delta");
        assert_eq!(delta.text.as_deref(), Some("Error: rate limit reached"));
    }

    #[test]
    fn catalog_filters_non_chat_models_and_collapses_revisions() {
        let raw = r#"{"data":[
            {"id":"llama-3.3-70b"},
            {"id":"llama-3.3-70b-preview"},
            {"id":"whisper-large-v3"},
            {"id":"llama-guard-3-8b"}
        ]}"#;
        assert_eq!(
            provider().normalize_model_list(raw),
            vec!["llama-3.3-70b"]
        );
    }

    #[tokio::test]
    async fn env_gated_smoke_lists_models_if_key_present() {
        if std::env::var("GROQ_API_KEY")
            .unwrap_or_default()
            .trim()
            .is_empty()
        {
            eprintln!("skipping Groq smoke test (GROQ_API_KEY missing)");
            return;
        }
        let client = crate::ChatClient::new(std::sync::Arc::new(
            GroqProvider::from_env().expect("provider"),
        ))
        .expect("client");
        let models = client.fetch_model_names().await.expect("catalog");
        assert!(!models.is_empty(), "Groq catalog should not be empty");
    }
}
