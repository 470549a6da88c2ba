//! SSE (Server-Sent Events) stream parser
//!
//! Parses the SSE framing used by the chat streaming endpoint.
//! SSE format consists of:
//! - `event: <type>` - event type line
//! - `data: <json>` - data payload line
//! - Empty line - signals end of event
//! - Lines starting with `:` - comments (ignored)
//!
//! # Module structure
//! - `events` - Event type definitions (StreamEvent enum, SseLine, SseParseError)
//! - `parser` - Parsing logic (SseParser, parse_sse_line, parse_stream_event)

mod events;
mod parser;

pub use events::{SseLine, SseParseError, StreamEvent};
pub use parser::{parse_sse_line, parse_stream_event, SseParser};
