use crate::provider::ProviderId;

/// Errors raised by a provider adapter while building requests or decoding
/// wire lines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The backend cannot be used at all: missing API key, no model
    /// selected. Raised before any transport is opened.
    #[error("provider not configured ({provider}): {message}")]
    NotConfigured {
        provider: ProviderId,
        message: String,
    },
    /// Provider returned an application-level failure (HTTP status, auth, etc.).
    #[error("provider error ({provider}): {message}")]
    Provider {
        provider: ProviderId,
        message: String,
        status_code: Option<u16>,
    },
    /// Provider response shape was invalid in a way that cannot be skipped.
    #[error("protocol error ({provider}): {message}")]
    Protocol {
        provider: ProviderId,
        message: String,
    },
}

impl ProviderError {
    /// Creates a not-configured error.
    pub fn not_configured(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::NotConfigured {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a provider-level error.
    pub fn provider(
        provider: impl Into<ProviderId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Returns the provider associated with this error.
    pub fn provider_id(&self) -> &ProviderId {
        match self {
            Self::NotConfigured { provider, .. }
            | Self::Provider { provider, .. }
            | Self::Protocol { provider, .. } => provider,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::NotConfigured { message, .. }
            | Self::Provider { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }
}

/// Transport-level failures from the streaming HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent (connect failure, timeout, bad URL).
    #[error("request failed: {0}")]
    Request(String),
    /// The server answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    /// The response stream failed mid-read.
    #[error("stream read failed: {0}")]
    Read(String),
}

/// Top-level error type for the public engine API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Invalid engine construction or client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Adapter-level failure, surfaced before or during a stream.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Transport failure with no partial text to degrade to.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Internal invariant violation (a session task vanished, for example).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl EngineError {
    /// True when the failure is a missing-credential/missing-model error
    /// that no retry can fix.
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::NotConfigured { .. }))
    }
}
