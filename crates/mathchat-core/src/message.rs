//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry in the session history.
///
/// History is append-only: entries are never removed individually,
/// only cleared in bulk, so display indices stay valid for the
/// session lifetime. The only in-place mutation is the
/// `include_in_context` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Opt-in flag: only flagged messages are replayed when building
    /// the context for the next request. Defaults to false so context
    /// growth stays bounded over a long session.
    #[serde(default)]
    pub include_in_context: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            include_in_context: false,
        }
    }

    /// Projects this message into the reduced request shape.
    pub fn as_context(&self) -> ContextMessage {
        ContextMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Reduced projection of a [`Message`] used in request bodies.
/// Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }

    #[test]
    fn include_in_context_defaults_to_false() {
        let message = Message::user("hi");
        assert!(!message.include_in_context);

        // Also when the field is absent in serialized form.
        let parsed: Message = serde_json::from_str(
            r#"{"role":"user","content":"hi","created_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(!parsed.include_in_context);
    }

    #[test]
    fn as_context_drops_metadata() {
        let mut message = Message::assistant("answer");
        message.include_in_context = true;
        let context = message.as_context();
        assert_eq!(context.role, Role::Assistant);
        assert_eq!(context.content, "answer");
    }
}
