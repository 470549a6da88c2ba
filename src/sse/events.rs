//! Stream event types
//!
//! Contains the StreamEvent enum with all event variants the backend can
//! push over a chat stream, plus line/error types used during SSE parsing.

use serde_json::Value;

/// Typed events delivered over a chat stream.
///
/// The wire shape is one SSE event per discrete message, with the event
/// type either in the `event:` field or as a `"type"` discriminator inside
/// the JSON data. Unknown types decode to [`StreamEvent::Unknown`] so new
/// server-side events never break older clients.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Server persisted an optimistically-sent user message; carries the
    /// identity to rewrite the local copy with.
    UserMessageSaved {
        client_message_id: String,
        server_message_timestamp: String,
        content: String,
    },
    /// Text fragment for the in-flight assistant message.
    Token { text: String },
    /// A server-side tool invocation started.
    ToolStart { name: String, input: Value },
    /// A server-side tool invocation finished.
    ToolEnd {
        name: String,
        output_summary: String,
        error: Option<String>,
    },
    /// The assistant turn is complete.
    StreamEnd,
    /// Error reported by the backend.
    Error { message: String },
    /// Heartbeat/keepalive.
    Ping,
    /// Unrecognized event type - ignored by the reducer.
    Unknown { event_type: String },
}

impl StreamEvent {
    /// Returns the event type name as a string for logging.
    pub fn event_type_name(&self) -> &'static str {
        match self {
            StreamEvent::UserMessageSaved { .. } => "user_message_saved",
            StreamEvent::Token { .. } => "token",
            StreamEvent::ToolStart { .. } => "tool_start",
            StreamEvent::ToolEnd { .. } => "tool_end",
            StreamEvent::StreamEnd => "stream_end",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Ping => "ping",
            StreamEvent::Unknown { .. } => "unknown",
        }
    }
}

/// Represents a parsed SSE line
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// Event type declaration (e.g., "event: token")
    Event(String),
    /// Data payload (e.g., "data: {\"type\": \"token\", \"data\": \"hi\"}")
    Data(String),
    /// Empty line - signals end of event
    Empty,
    /// Comment line (starts with ':')
    Comment(String),
}

/// Errors that can occur during SSE parsing
#[derive(Debug, Clone, PartialEq)]
pub enum SseParseError {
    /// Invalid JSON in data payload
    InvalidJson { event_type: String, source: String },
    /// Missing data for an event type that requires a payload
    MissingData { event_type: String },
}

impl std::fmt::Display for SseParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SseParseError::InvalidJson { event_type, source } => {
                write!(f, "Invalid JSON for event '{}': {}", event_type, source)
            }
            SseParseError::MissingData { event_type } => {
                write!(f, "Missing data for event type: {}", event_type)
            }
        }
    }
}

impl std::error::Error for SseParseError {}
