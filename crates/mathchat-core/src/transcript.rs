//! Transcript export/import.
//!
//! The on-disk shape is the history itself: an ordered JSON array of
//! message records with RFC 3339 timestamps.

use crate::error::{ChatError, ChatResult};
use crate::message::Message;

/// Serializes the history as pretty-printed JSON.
pub fn export(history: &[Message]) -> String {
    serde_json::to_string_pretty(history).unwrap_or_else(|_| "[]".to_string())
}

/// Parses a transcript produced by [`export`].
///
/// # Errors
/// `ImportParse` when the payload is not a valid message list.
pub fn import(json: &str) -> ChatResult<Vec<Message>> {
    serde_json::from_str(json).map_err(|err| ChatError::ImportParse(err.to_string()))
}
