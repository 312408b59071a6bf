//! Client-side engine for a streaming AI assistant panel.
//!
//! Talks to pluggable model backends (a local completion-style server plus
//! cloud chat/SSE providers), streams partial output back through a delta
//! callback, turns the growing buffer into renderable blocks while
//! filtering "thinking" scratch output, and detects structured file-edit
//! payloads embedded in free text.
//!
//! Vendor-specific APIs are namespaced under `vendors::*`.
//!
//! # Streaming usage (local Ollama)
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sidekick_engine::prelude::*;
//! use sidekick_engine::vendors::ollama::OllamaProvider;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), EngineError> {
//! let client = ChatClient::new(Arc::new(OllamaProvider::from_env()))?;
//!
//! let handle = client.send_message(
//!     OutgoingMessage::new("Say hello", "llama3"),
//!     |delta| print!("{delta}"),
//! )?;
//! let outcome = handle.finish().await?;
//!
//! let mut parser = ContentParser::new();
//! for block in parser.parse(&outcome.text) {
//!     println!("{block:?}");
//! }
//! # Ok(())
//! # }
//! ```

/// Model-catalog name filtering and canonicalization.
pub mod catalog;
/// Client surface: session manager, message handle, single-flight sends.
pub mod client;
/// Scratch filtering and block decomposition of response text.
pub mod content;
/// File-edit payload detection in free-form output.
pub mod edits;
/// Public error types used by the engine API.
pub mod errors;
/// Common imports for typical usage.
pub mod prelude;
/// Provider adapter contract and wire-level request types.
pub mod provider;
/// Streaming HTTP primitive, line decoding, and the catalog GET cache.
pub mod transport;
/// Vendor-specific adapters and configuration.
pub mod vendors;

pub use catalog::normalize_model_names;
pub use client::{Attachment, ChatClient, ChatOutcome, MessageHandle, OutgoingMessage};
pub use content::{
    Cleaned, ContentParser, OrderedItem, ParsedBlock, ScratchFilter, THINKING_PLACEHOLDER,
    parse_blocks,
};
pub use edits::{FileEdit, FileEditPayload, detect_file_edit};
pub use errors::{EngineError, ProviderError, TransportError};
pub use provider::{
    ChatRequest, ChunkDelta, HistoryTurn, HttpMethod, ProviderAdapter, ProviderId, Role,
    WireRequest,
};
pub use transport::{ByteStream, HttpTransport, Transport};
