//! Event reducer for the chat transcript.
//!
//! [`apply`] folds one incoming stream event into the transcript. It is a
//! pure, total function: it never panics, and unknown event types leave the
//! transcript untouched. All ordering and reconciliation rules live here so
//! the transport stays a dumb pipe and the engine only wires callbacks.

use crate::models::{DisplayMessage, MessageKind, MessageRole, ToolStatus};
use crate::sse::StreamEvent;

/// Outcome of folding one event into the transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    /// The active stream is finished (stream_end or a server error).
    pub stream_ended: bool,
    /// Session-level error reported by the backend. Not inserted into the
    /// transcript; partial content already rendered is retained.
    pub session_error: Option<String>,
}

/// Fold `event` into `transcript`.
///
/// `streaming_id` is the identity minted once per stream and reused for
/// its lifetime; token events append to (or revive) the message carrying
/// that identity.
pub fn apply(
    transcript: &mut Vec<DisplayMessage>,
    streaming_id: &str,
    event: &StreamEvent,
) -> Applied {
    match event {
        StreamEvent::UserMessageSaved {
            client_message_id,
            server_message_timestamp,
            ..
        } => {
            // In-place identity rewrite; ordinal position is preserved.
            // The message may already be gone (fast edit-cancel race).
            if let Some(msg) = transcript
                .iter_mut()
                .find(|m| m.timestamp == *client_message_id && m.role == MessageRole::User)
            {
                msg.timestamp = server_message_timestamp.clone();
            }
            Applied::default()
        }

        StreamEvent::Token { text } => {
            if let Some(msg) = find_text_message(transcript, streaming_id) {
                msg.append_token(text);
            } else if !text.is_empty() {
                // Late or duplicate token after the streaming message was
                // pruned: start a new message rather than dropping content.
                let mut msg = DisplayMessage::streaming_placeholder(streaming_id);
                msg.content = text.clone();
                transcript.push(msg);
            }
            Applied::default()
        }

        StreamEvent::ToolStart { name, input } => {
            let tool = DisplayMessage::tool_running(name.clone(), input.clone());
            // Tool invocations are narrated as having occurred just prior
            // to the assistant's continuation.
            let pos = transcript
                .iter()
                .position(|m| m.timestamp == streaming_id && m.kind == MessageKind::Text);
            match pos {
                Some(idx) => transcript.insert(idx, tool),
                None => transcript.push(tool),
            }
            Applied::default()
        }

        StreamEvent::ToolEnd {
            name,
            output_summary,
            error,
        } => {
            // Search from the end so repeated invocations of the same tool
            // resolve the most recent running instance.
            if let Some(idx) = transcript.iter().rposition(|m| {
                m.kind == MessageKind::ToolStatus
                    && m.tool_name.as_deref() == Some(name)
                    && m.tool_status == Some(ToolStatus::Running)
            }) {
                match error {
                    Some(err) => transcript[idx].fail_tool(err.clone()),
                    None => transcript[idx].complete_tool(output_summary.clone()),
                }
            }
            Applied::default()
        }

        StreamEvent::StreamEnd => {
            if let Some(msg) = find_text_message(transcript, streaming_id) {
                msg.is_streaming = false;
            } else if let Some(msg) = transcript
                .iter_mut()
                .rev()
                .find(|m| m.role == MessageRole::Assistant && m.is_streaming)
            {
                // The streaming message was pruned; clear the most recent
                // assistant message still marked streaming.
                msg.is_streaming = false;
            }
            Applied {
                stream_ended: true,
                session_error: None,
            }
        }

        StreamEvent::Error { message } => Applied {
            stream_ended: true,
            session_error: Some(message.clone()),
        },

        StreamEvent::Ping | StreamEvent::Unknown { .. } => Applied::default(),
    }
}

fn find_text_message<'a>(
    transcript: &'a mut [DisplayMessage],
    streaming_id: &str,
) -> Option<&'a mut DisplayMessage> {
    transcript
        .iter_mut()
        .find(|m| m.timestamp == streaming_id && m.kind == MessageKind::Text)
}
