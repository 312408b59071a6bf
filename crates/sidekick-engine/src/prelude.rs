//! Common imports for typical engine usage.
//!
//! This module intentionally exports the most frequently used client and
//! parsing types so application code needs fewer import lines.
pub use crate::{
    ChatClient, ChatOutcome, ContentParser, EngineError, FileEditPayload, HistoryTurn,
    MessageHandle, OutgoingMessage, ParsedBlock, ProviderId, Role, detect_file_edit, parse_blocks,
};
