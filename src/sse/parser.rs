//! SSE stream parsing logic
//!
//! Contains the stateful SseParser for accumulating lines and emitting
//! events, as well as the core parsing functions.

use serde::Deserialize;
use serde_json::Value;

use crate::sse::events::{SseLine, SseParseError, StreamEvent};

#[derive(Debug, Deserialize)]
struct UserMessageSavedPayload {
    client_message_id: String,
    server_message_timestamp: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ToolStartPayload {
    name: String,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Deserialize)]
struct ToolEndPayload {
    name: String,
    #[serde(default)]
    output_summary: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Parse a single SSE line into its component type
pub fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() {
        return SseLine::Empty;
    }

    if let Some(stripped) = line.strip_prefix(':') {
        return SseLine::Comment(stripped.trim().to_string());
    }

    if let Some(rest) = line.strip_prefix("event:") {
        return SseLine::Event(rest.trim().to_string());
    }

    if let Some(rest) = line.strip_prefix("data:") {
        return SseLine::Data(rest.trim().to_string());
    }

    // Unknown line format - treat as comment
    SseLine::Comment(line.to_string())
}

fn invalid_json(event_type: &str, err: impl std::fmt::Display) -> SseParseError {
    SseParseError::InvalidJson {
        event_type: event_type.to_string(),
        source: err.to_string(),
    }
}

/// Parse an event type plus its data payload into a typed StreamEvent.
///
/// `data` is the payload with any `{type, data}` envelope already removed.
/// Unknown event types always succeed as [`StreamEvent::Unknown`].
pub fn parse_stream_event(event_type: &str, data: &Value) -> Result<StreamEvent, SseParseError> {
    match event_type {
        "token" => {
            // Token payloads are raw string fragments, but tolerate the
            // object forms some backends emit.
            let text = match data {
                Value::String(s) => s.clone(),
                Value::Object(obj) => obj
                    .get("data")
                    .or_else(|| obj.get("text"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| invalid_json(event_type, "missing text field"))?,
                Value::Null => String::new(),
                other => return Err(invalid_json(event_type, format!("unexpected payload: {}", other))),
            };
            Ok(StreamEvent::Token { text })
        }
        "user_message_saved" => {
            let payload: UserMessageSavedPayload =
                serde_json::from_value(data.clone()).map_err(|e| invalid_json(event_type, e))?;
            Ok(StreamEvent::UserMessageSaved {
                client_message_id: payload.client_message_id,
                server_message_timestamp: payload.server_message_timestamp,
                content: payload.content,
            })
        }
        "tool_start" => {
            let payload: ToolStartPayload =
                serde_json::from_value(data.clone()).map_err(|e| invalid_json(event_type, e))?;
            Ok(StreamEvent::ToolStart {
                name: payload.name,
                input: payload.input,
            })
        }
        "tool_end" => {
            let payload: ToolEndPayload =
                serde_json::from_value(data.clone()).map_err(|e| invalid_json(event_type, e))?;
            Ok(StreamEvent::ToolEnd {
                name: payload.name,
                output_summary: payload.output_summary,
                error: payload.error,
            })
        }
        "stream_end" | "done" => Ok(StreamEvent::StreamEnd),
        "error" => {
            let payload: ErrorPayload =
                serde_json::from_value(data.clone()).map_err(|e| invalid_json(event_type, e))?;
            Ok(StreamEvent::Error {
                message: payload.message,
            })
        }
        "ping" => Ok(StreamEvent::Ping),
        other => Ok(StreamEvent::Unknown {
            event_type: other.to_string(),
        }),
    }
}

/// Stateful SSE parser that accumulates lines and emits complete events
#[derive(Debug, Default)]
pub struct SseParser {
    /// Current event type being accumulated
    current_event_type: Option<String>,
    /// Accumulated data lines (SSE allows multiple data: lines)
    data_buffer: Vec<String>,
}

impl SseParser {
    /// Create a new SSE parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a line to the parser, potentially returning a complete event
    ///
    /// Returns:
    /// - `Ok(Some(event))` - A complete event was parsed
    /// - `Ok(None)` - Line was consumed but event is incomplete
    /// - `Err(error)` - Parse error occurred
    pub fn feed_line(&mut self, line: &str) -> Result<Option<StreamEvent>, SseParseError> {
        match parse_sse_line(line) {
            SseLine::Event(event_type) => {
                self.current_event_type = Some(event_type);
                Ok(None)
            }
            SseLine::Data(data) => {
                self.data_buffer.push(data);
                Ok(None)
            }
            SseLine::Empty => self.try_emit_event(),
            SseLine::Comment(_) => Ok(None),
        }
    }

    /// Try to emit a complete event from accumulated state
    fn try_emit_event(&mut self) -> Result<Option<StreamEvent>, SseParseError> {
        if self.current_event_type.is_none() && self.data_buffer.is_empty() {
            return Ok(None);
        }

        let mut event_type = self.current_event_type.take();
        let raw = self.data_buffer.join("\n");
        self.data_buffer.clear();

        // Non-JSON data is carried through as a string payload.
        let mut data: Value = serde_json::from_str(&raw).unwrap_or(Value::String(raw.clone()));

        // The backend usually omits the `event:` field and sends
        // data: {"type":"token","data":"hello"}. Pull the type out of the
        // envelope and unwrap its data level.
        if event_type.is_none() {
            if let Value::Object(ref obj) = data {
                if let Some(t) = obj.get("type").and_then(|v| v.as_str()) {
                    event_type = Some(t.to_string());
                    if let Some(inner) = obj.get("data") {
                        data = inner.clone();
                    }
                }
            }
        }

        match event_type {
            Some(et) => {
                let payload_missing = matches!(&data, Value::String(s) if s.is_empty());
                if payload_missing && !matches!(et.as_str(), "stream_end" | "done" | "ping" | "token") {
                    return Err(SseParseError::MissingData { event_type: et });
                }
                parse_stream_event(&et, &data).map(Some)
            }
            None => {
                // Data without a type - treat as a token fragment
                if matches!(&data, Value::String(s) if s.is_empty()) {
                    Ok(None)
                } else {
                    parse_stream_event("token", &data).map(Some)
                }
            }
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.current_event_type = None;
        self.data_buffer.clear();
    }
}
