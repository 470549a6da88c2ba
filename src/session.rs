//! Session store.
//!
//! Single authoritative snapshot of one flow's chat UI state: the chat
//! list, the active transcript, in-flight operation flags, and the
//! streaming/edit bookkeeping. All mutation happens through methods here;
//! the store never performs I/O.

use crate::models::{ChatSummary, DisplayMessage};

/// Authoritative client-side state for one flow.
#[derive(Debug, Default)]
pub struct SessionStore {
    /// Flow that owns all chats in this store
    pub flow_id: String,
    /// Known chats, newest first
    pub chat_list: Vec<ChatSummary>,
    /// Currently selected chat, if any
    pub active_chat_id: Option<String>,
    /// Transcript of the active chat
    pub transcript: Vec<DisplayMessage>,
    /// Identity of the user message being edited, set by `begin_edit`
    pub pending_edit_timestamp: Option<String>,
    /// Identity of the assistant message the live stream writes into
    pub streaming_message_id: Option<String>,
    /// A send or edit stream is in flight
    pub is_sending: bool,
    pub is_loading_chats: bool,
    pub is_loading_transcript: bool,
    /// Guards against concurrent chat creation
    pub is_creating_chat: bool,
    /// Most recent session-level error, cleared on the next operation
    pub error: Option<String>,
}

/// Immutable copy of the store, handed to its embedder for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub flow_id: String,
    pub chat_list: Vec<ChatSummary>,
    pub active_chat_id: Option<String>,
    pub transcript: Vec<DisplayMessage>,
    pub is_sending: bool,
    pub is_loading_chats: bool,
    pub is_loading_transcript: bool,
    pub is_creating_chat: bool,
    pub has_pending_edit: bool,
    pub error: Option<String>,
}

impl SessionStore {
    pub fn new(flow_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            ..Self::default()
        }
    }

    /// Drop everything belonging to the previous flow and become a fresh
    /// store for `flow_id`.
    pub fn reset_for_flow(&mut self, flow_id: impl Into<String>) {
        *self = Self::new(flow_id);
    }

    /// Replace the chat list after a fetch.
    pub fn set_chat_list(&mut self, chats: Vec<ChatSummary>) {
        self.chat_list = chats;
    }

    /// Put a newly created chat at the front of the list.
    pub fn upsert_chat(&mut self, chat: ChatSummary) {
        self.chat_list.retain(|c| c.id != chat.id);
        self.chat_list.insert(0, chat);
    }

    pub fn remove_chat(&mut self, chat_id: &str) {
        self.chat_list.retain(|c| c.id != chat_id);
        if self.active_chat_id.as_deref() == Some(chat_id) {
            self.active_chat_id = None;
            self.transcript.clear();
            self.clear_streaming_state();
        }
    }

    /// Rename a chat in place and return its prior name for rollback.
    pub fn apply_rename(&mut self, chat_id: &str, name: &str) -> Option<String> {
        let chat = self.chat_list.iter_mut().find(|c| c.id == chat_id)?;
        let prior = std::mem::replace(&mut chat.name, name.to_string());
        Some(prior)
    }

    /// Make `chat_id` active with the given transcript.
    pub fn activate_chat(&mut self, chat_id: impl Into<String>, transcript: Vec<DisplayMessage>) {
        self.active_chat_id = Some(chat_id.into());
        self.transcript = transcript;
        self.clear_streaming_state();
        self.pending_edit_timestamp = None;
        self.error = None;
    }

    pub fn push_message(&mut self, message: DisplayMessage) {
        self.transcript.push(message);
    }

    /// Drop the message with identity `timestamp` and everything after it.
    /// No-op when the identity is not present.
    pub fn truncate_from(&mut self, timestamp: &str) {
        if let Some(pos) = self.transcript.iter().position(|m| m.timestamp == timestamp) {
            self.transcript.truncate(pos);
        }
    }

    /// Mark a stream as open on the message with identity `streaming_id`.
    pub fn begin_stream(&mut self, streaming_id: impl Into<String>) {
        self.streaming_message_id = Some(streaming_id.into());
        self.is_sending = true;
        self.error = None;
    }

    /// Record the natural or erroneous end of a stream.
    ///
    /// Keeps `streaming_message_id` so that tokens arriving after the end
    /// marker still land in the transcript. Only cancellation clears it.
    pub fn end_stream(&mut self, error: Option<String>) {
        self.is_sending = false;
        if error.is_some() {
            self.error = error;
        }
    }

    /// Forget the streaming identity so late events are ignored.
    pub fn clear_stream_marker(&mut self) {
        self.streaming_message_id = None;
        self.is_sending = false;
    }

    /// Clear every streaming flag and marker, including on messages.
    pub fn clear_streaming_state(&mut self) {
        self.streaming_message_id = None;
        self.is_sending = false;
        for msg in &mut self.transcript {
            msg.is_streaming = false;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            flow_id: self.flow_id.clone(),
            chat_list: self.chat_list.clone(),
            active_chat_id: self.active_chat_id.clone(),
            transcript: self.transcript.clone(),
            is_sending: self.is_sending,
            is_loading_chats: self.is_loading_chats,
            is_loading_transcript: self.is_loading_transcript,
            is_creating_chat: self.is_creating_chat,
            has_pending_edit: self.pending_edit_timestamp.is_some(),
            error: self.error.clone(),
        }
    }
}
