use std::fmt;

use crate::errors::ProviderError;

/// Stable identifier for a backend implementation (for example `ollama`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProviderId(pub String);

impl ProviderId {
    /// Creates a provider id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the provider id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Speaker of one prior conversation turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn resent with a request so chat backends keep continuity.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Adapter input for one send. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub history: Vec<HistoryTurn>,
    /// Opaque continuity token from a completion-style backend's previous
    /// response. The caller resends it; the server keeps no state.
    pub context: Option<serde_json::Value>,
}

/// HTTP method for a wire request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully-built HTTP request, ready for the transport layer.
#[derive(Clone, Debug, PartialEq)]
pub struct WireRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl WireRequest {
    /// Creates a GET request with no body.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a POST request with a JSON body.
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Cache key for GET responses: URL plus sorted headers, so the same
    /// catalog fetch with reordered headers still hits.
    pub(crate) fn cache_key(&self) -> String {
        let mut headers: Vec<String> = self
            .headers
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        headers.sort();
        format!("{}|{}", self.url, headers.join(","))
    }
}

/// Adapter-normalized content of one decoded wire line.
///
/// `None` from [`ProviderAdapter::extract_delta`] means the line carried
/// nothing useful (keep-alive, malformed JSON, SSE comment) and is skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkDelta {
    /// Text fragment to append to the visible response.
    pub text: Option<String>,
    /// Replacement continuity token (completion-style backends only).
    pub context: Option<serde_json::Value>,
}

impl ChunkDelta {
    /// Creates a text-only delta.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            context: None,
        }
    }
}

/// One backend family: builds wire requests and decodes wire lines.
///
/// Adapters are pure translators; all I/O, accumulation, and cancellation
/// live in the shared client/transport plumbing.
pub trait ProviderAdapter: Send + Sync {
    /// Stable id for logs and error attribution.
    fn id(&self) -> ProviderId;

    /// Builds the streaming request for one send.
    ///
    /// Fails with [`ProviderError::NotConfigured`] before any transport is
    /// opened when a credential or model is missing.
    fn build_request(&self, request: &ChatRequest) -> Result<WireRequest, ProviderError>;

    /// Extracts the normalized delta from one decoded line.
    ///
    /// A malformed line yields `None`; it never terminates the stream.
    fn extract_delta(&self, line: &str) -> Option<ChunkDelta>;

    /// Builds the model-catalog request.
    fn list_models_request(&self) -> Result<WireRequest, ProviderError>;

    /// Turns a raw catalog response body into a clean, sorted model list.
    fn normalize_model_list(&self, raw: &str) -> Vec<String>;
}
