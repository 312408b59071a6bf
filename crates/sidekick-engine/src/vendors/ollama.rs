//! Local completion-style backend speaking Ollama's newline-delimited JSON
//! protocol.
//!
//! Each response line is one JSON object carrying a `response` text
//! fragment. The final line also carries an opaque `context` array; the
//! caller resends it on the next request to keep continuity — the server
//! itself is stateless between requests.

use serde_json::json;

use crate::catalog::normalize_model_names;
use crate::errors::ProviderError;
use crate::provider::{ChatRequest, ChunkDelta, ProviderAdapter, ProviderId, Role, WireRequest};

const OLLAMA_PROVIDER: &str = "ollama";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Configuration for the local Ollama server.
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Base URL of the server.
    pub base_url: String,
}

impl OllamaConfig {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Reads `OLLAMA_BASE_URL`, falling back to the default local address.
    /// The local server needs no credential, so this cannot fail.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE_URL").unwrap_or_default();
        if base_url.trim().is_empty() {
            Self::new()
        } else {
            Self { base_url }
        }
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url.trim_end_matches('/'))
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider adapter for the Ollama generate API (streaming).
pub struct OllamaProvider {
    config: OllamaConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(OllamaConfig::from_env())
    }
}

impl ProviderAdapter for OllamaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(OLLAMA_PROVIDER)
    }

    fn build_request(&self, request: &ChatRequest) -> Result<WireRequest, ProviderError> {
        if request.model.trim().is_empty() {
            return Err(ProviderError::not_configured(
                OLLAMA_PROVIDER,
                "no model selected",
            ));
        }
        let mut body = json!({
            "model": request.model,
            "prompt": render_prompt(request),
            "stream": true,
        });
        if let Some(temperature) = request.temperature {
            body["options"] = json!({ "temperature": temperature });
        }
        if let Some(context) = &request.context {
            body["context"] = context.clone();
        }
        Ok(WireRequest::post(self.config.generate_url(), body))
    }

    fn extract_delta(&self, line: &str) -> Option<ChunkDelta> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
            // Surface backend errors as displayable text instead of
            // dropping them.
            return Some(ChunkDelta::text(format!("Error: {message}")));
        }
        let mut delta = ChunkDelta::default();
        if let Some(text) = value.get("response").and_then(|v| v.as_str())
            && !text.is_empty()
        {
            delta.text = Some(text.to_string());
        }
        if let Some(context) = value.get("context")
            && !context.is_null()
        {
            delta.context = Some(context.clone());
        }
        if delta.text.is_none() && delta.context.is_none() {
            None
        } else {
            Some(delta)
        }
    }

    fn list_models_request(&self) -> Result<WireRequest, ProviderError> {
        Ok(WireRequest::get(self.config.tags_url()))
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
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        normalize_model_names(names, &[])
    }
}

/// Folds prior turns into the prompt when no continuity token exists yet;
/// once a context token is flowing it carries the conversation instead.
fn render_prompt(request: &ChatRequest) -> String {
    if request.context.is_some() || request.history.is_empty() {
        return request.prompt.clone();
    }
    let mut rendered = String::new();
    for turn in &request.history {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        rendered.push_str(speaker);
        rendered.push_str(": ");
        rendered.push_str(&turn.text);
        rendered.push('\n');
    }
    rendered.push_str("User: ");
    rendered.push_str(&request.prompt);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HistoryTurn;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "llama3".into(),
            prompt: "hello".into(),
            temperature: None,
            history: Vec::new(),
            context: None,
        }
    }

    fn provider() -> OllamaProvider {
        OllamaProvider::new(OllamaConfig::new())
    }

    #[test]
    fn build_request_targets_generate_with_stream() {
        let wire = provider().build_request(&request()).expect("wire");
        assert_eq!(wire.url, "http://localhost:11434/api/generate");
        let body = wire.body.expect("body");
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], true);
        assert!(body.get("context").is_none());
    }

    #[test]
    fn context_token_is_resent_verbatim() {
        let mut req = request();
        req.context = Some(serde_json::json!([1, 2, 3]));
        let wire = provider().build_request(&req).expect("wire");
        assert_eq!(wire.body.expect("body")["context"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn history_is_folded_only_without_a_context_token() {
        let mut req = request();
        req.history = vec![HistoryTurn::user("hi"), HistoryTurn::assistant("hey")];
        let wire = provider().build_request(&req).expect("wire");
        let prompt = wire.body.expect("body")["prompt"].as_str().expect("prompt").to_string();
        assert!(prompt.contains("User: hi"));
        assert!(prompt.contains("Assistant: hey"));

        req.context = Some(serde_json::json!([9]));
        let wire = provider().build_request(&req).expect("wire");
        assert_eq!(wire.body.expect("body")["prompt"], "hello");
    }

    #[test]
    fn missing_model_is_a_config_error() {
        let mut req = request();
        req.model = "  ".into();
        let err = provider().build_request(&req).expect_err("no model");
        assert!(matches!(err, ProviderError::NotConfigured { .. }));
    }

    #[test]
    fn extract_delta_reads_response_and_context() {
        let p = provider();
        let delta = p
            .extract_delta(r#"{"response":"Hel","done":false}"#)
            .expect("delta");
        assert_eq!(delta.text.as_deref(), Some("Hel"));
        assert!(delta.context.is_none());

        let done = p
            .extract_delta(r#"{"response":"","done":true,"context":[5,7]}"#)
            .expect("final line carries context");
        assert!(done.text.is_none());
        assert_eq!(done.context, Some(serde_json::json!([5, 7])));
    }

    #[test]
    fn malformed_and_empty_lines_are_swallowed() {
        let p = provider();
        assert!(p.extract_delta("").is_none());
        assert!(p.extract_delta("not json").is_none());
        assert!(p.extract_delta(r#"{"done":false}"#).is_none());
    }

    #[test]
    fn backend_error_lines_become_displayable_text() {
        let delta = provider()
            .extract_delta(r#"{"error":"model not found"}"#)
            .expect("delta");
        assert_eq!(delta.text.as_deref(), Some("Error: model not found"));
    }

    #[test]
    fn tag_catalog_is_normalized_and_sorted() {
        let raw = r#"{"models":[{"name":"qwen2:7b"},{"name":"llama3:8b"}]}"#;
        assert_eq!(
            provider().normalize_model_list(raw),
            vec!["llama3:8b", "qwen2:7b"]
        );
        assert!(provider().normalize_model_list("oops").is_empty());
    }
}
