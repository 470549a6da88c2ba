//! Unified error type for the chat engine.
//!
//! Errors fall into four categories with distinct propagation rules:
//! connectivity and server errors terminate the current send/edit and set
//! the session-visible error string; protocol errors end the stream but
//! keep any partial transcript; validation errors are rejected before any
//! network call is made.

use thiserror::Error;

use crate::sse::SseParseError;
use crate::traits::HttpError;

/// Error type for all engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    /// Stream could not open or died silently; recoverable by retrying.
    #[error("connection failed: {0}")]
    Connectivity(String),

    /// Malformed or unexpected event framing mid-stream.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Error reported by the backend, surfaced verbatim.
    #[error("server error: {0}")]
    Server(String),

    /// Local precondition failure; never reaches the transport layer.
    #[error("{0}")]
    Validation(String),
}

impl ChatError {
    /// Whether retrying the failed operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Connectivity(_))
    }

    /// Message suitable for the session-visible error string.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Connectivity(_) => {
                "Connection to the agent was lost. Try sending again.".to_string()
            }
            ChatError::Protocol(msg) => format!("The response could not be read: {}", msg),
            ChatError::Server(msg) => msg.clone(),
            ChatError::Validation(msg) => msg.clone(),
        }
    }
}

impl From<SseParseError> for ChatError {
    fn from(err: SseParseError) -> Self {
        ChatError::Protocol(err.to_string())
    }
}

impl From<HttpError> for ChatError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::ConnectionFailed(msg) => ChatError::Connectivity(msg),
            HttpError::Timeout(msg) => ChatError::Connectivity(msg),
            HttpError::Io(msg) => ChatError::Connectivity(msg),
            HttpError::Cancelled => ChatError::Connectivity("request cancelled".to_string()),
            HttpError::ServerError { status, message } => {
                ChatError::Server(format!("{} ({})", message, status))
            }
            HttpError::InvalidUrl(msg) => ChatError::Validation(format!("invalid URL: {}", msg)),
            HttpError::Other(msg) => ChatError::Connectivity(msg),
        }
    }
}
