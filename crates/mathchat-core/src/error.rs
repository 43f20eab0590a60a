//! Error taxonomy for the chat client.

use std::fmt;

/// Failures surfaced by the streaming client and session.
///
/// Decode-level failures (a malformed stream line) never appear here;
/// they are swallowed inside the frame decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// No model id is configured for the session.
    NoModelSelected,
    /// The backend answered with a non-success status.
    Backend { status: u16, status_text: String },
    /// The in-flight request was cancelled. `user_initiated` is false
    /// when the token fired without the session's own cancel call,
    /// which indicates an internal fault rather than a user action.
    Cancelled { user_initiated: bool },
    /// A request is already active for this session.
    AlreadyInFlight,
    /// Network-level failure (connect, read, timeout).
    Transport(String),
    /// A transcript import payload could not be parsed. Non-fatal:
    /// the session keeps its prior history.
    ImportParse(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::NoModelSelected => write!(f, "no model selected"),
            ChatError::Backend {
                status,
                status_text,
            } => {
                write!(f, "backend error: HTTP {status} {status_text}")
            }
            ChatError::Cancelled {
                user_initiated: true,
            } => write!(f, "request cancelled"),
            ChatError::Cancelled {
                user_initiated: false,
            } => write!(f, "request cancelled unexpectedly"),
            ChatError::AlreadyInFlight => write!(f, "a request is already in flight"),
            ChatError::Transport(message) => write!(f, "transport error: {message}"),
            ChatError::ImportParse(message) => {
                write!(f, "transcript import failed: {message}")
            }
        }
    }
}

impl std::error::Error for ChatError {}

/// Result type for chat operations.
pub type ChatResult<T> = std::result::Result<T, ChatError>;
