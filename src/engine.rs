//! Chat engine.
//!
//! Orchestrates the collaborators: validates intents, performs optimistic
//! store mutations, opens streams through the transport, and folds stream
//! events into the transcript via the reducer. The embedder drives it by
//! calling methods and rendering [`SessionSnapshot`]s.

use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::ChatError;
use crate::models::{
    is_edited_id, is_optimistic_id, mint_edited_user_id, mint_streaming_id, mint_user_id,
    ChatSummary, DisplayMessage, EditPayload, MessageKind, MessageRole, SendPayload,
};
use crate::reducer;
use crate::session::{SessionSnapshot, SessionStore};
use crate::traits::{ChatApi, StreamResponse};
use crate::transport::{open_stream, StreamCallbacks, StreamConfig, StreamHandle};

/// Page size used when hydrating the chat list.
const DEFAULT_PAGE_SIZE: u32 = 50;

/// Streaming chat session engine for one flow.
///
/// All methods take `&self`; the engine is safe to share behind an `Arc`.
/// Must run inside a tokio runtime: streams and last-active recording are
/// spawned tasks.
pub struct ChatEngine {
    api: Arc<dyn ChatApi>,
    store: Arc<Mutex<SessionStore>>,
    stream: Mutex<Option<StreamHandle>>,
    config: StreamConfig,
}

impl ChatEngine {
    pub fn new(api: Arc<dyn ChatApi>, flow_id: impl Into<String>) -> Self {
        Self::with_config(api, flow_id, StreamConfig::default())
    }

    pub fn with_config(
        api: Arc<dyn ChatApi>,
        flow_id: impl Into<String>,
        config: StreamConfig,
    ) -> Self {
        Self {
            api,
            store: Arc::new(Mutex::new(SessionStore::new(flow_id))),
            stream: Mutex::new(None),
            config,
        }
    }

    /// Current state for rendering.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.lock().unwrap().snapshot()
    }

    /// Hydrate the chat list and resume the last active chat.
    ///
    /// The chat list stays usable when the transcript fetch fails; the
    /// failure is surfaced through the snapshot's `error` instead of
    /// aborting initialization.
    pub async fn initialize(&self) -> Result<(), ChatError> {
        self.cancel_stream();
        let flow_id = {
            // Start from a clean store so re-initialization drops any
            // stale transcript, flags, or error.
            let mut store = self.store.lock().unwrap();
            let flow_id = store.flow_id.clone();
            store.reset_for_flow(flow_id.clone());
            store.is_loading_chats = true;
            flow_id
        };

        let chats = match self.api.list_chats(&flow_id, 0, DEFAULT_PAGE_SIZE).await {
            Ok(chats) => {
                let mut store = self.store.lock().unwrap();
                store.is_loading_chats = false;
                store.set_chat_list(chats.clone());
                chats
            }
            Err(err) => {
                let mut store = self.store.lock().unwrap();
                store.is_loading_chats = false;
                store.error = Some(err.user_message());
                return Err(err);
            }
        };

        // Last-active resume is best effort; fall back to the newest chat.
        let last_active = self.api.last_active_chat(&flow_id).await.unwrap_or(None);
        let target = last_active
            .filter(|id| chats.iter().any(|c| &c.id == id))
            .or_else(|| chats.first().map(|c| c.id.clone()));

        if let Some(chat_id) = target {
            if let Err(err) = self.load_transcript(&chat_id).await {
                tracing::warn!(%chat_id, error = %err, "transcript hydration failed");
                self.store.lock().unwrap().error = Some(err.user_message());
            }
        }
        Ok(())
    }

    /// Switch the active chat. No-op when `chat_id` is already active.
    pub async fn select_chat(&self, chat_id: &str) -> Result<(), ChatError> {
        {
            let store = self.store.lock().unwrap();
            if store.active_chat_id.as_deref() == Some(chat_id) {
                return Ok(());
            }
        }
        self.cancel_stream();
        {
            // Switch immediately so a failed fetch surfaces against the
            // selected chat, not the one left behind.
            let mut store = self.store.lock().unwrap();
            store.pending_edit_timestamp = None;
            store.error = None;
            store.active_chat_id = Some(chat_id.to_string());
            store.transcript.clear();
        }

        match self.load_transcript(chat_id).await {
            Ok(()) => {
                self.record_last_active(chat_id);
                Ok(())
            }
            Err(err) => {
                self.store.lock().unwrap().error = Some(err.user_message());
                Err(err)
            }
        }
    }

    /// Create a chat and make it active. Single-flight: a second call
    /// while one is outstanding is rejected.
    pub async fn create_chat(&self, name: Option<&str>) -> Result<ChatSummary, ChatError> {
        let flow_id = {
            let mut store = self.store.lock().unwrap();
            if store.is_creating_chat {
                return Err(ChatError::Validation(
                    "chat creation already in progress".to_string(),
                ));
            }
            store.is_creating_chat = true;
            store.flow_id.clone()
        };

        let result = self.api.create_chat(&flow_id, name).await;
        let chat = {
            let mut store = self.store.lock().unwrap();
            store.is_creating_chat = false;
            match result {
                Ok(chat) => {
                    store.upsert_chat(chat.clone());
                    chat
                }
                Err(err) => {
                    store.error = Some(err.user_message());
                    return Err(err);
                }
            }
        };

        self.cancel_stream();
        self.store
            .lock()
            .unwrap()
            .activate_chat(chat.id.clone(), Vec::new());
        self.record_last_active(&chat.id);
        Ok(chat)
    }

    /// Delete a chat. The store mutates only after the server acknowledges.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), ChatError> {
        match self.api.delete_chat(chat_id).await {
            Ok(()) => {
                let was_active =
                    self.store.lock().unwrap().active_chat_id.as_deref() == Some(chat_id);
                if was_active {
                    self.cancel_stream();
                }
                self.store.lock().unwrap().remove_chat(chat_id);
                Ok(())
            }
            Err(err) => {
                self.store.lock().unwrap().error = Some(err.user_message());
                Err(err)
            }
        }
    }

    /// Rename a chat optimistically; rolls back on server failure.
    pub async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), ChatError> {
        let prior = self.store.lock().unwrap().apply_rename(chat_id, name);
        let Some(prior) = prior else {
            return Err(ChatError::Validation(format!("unknown chat: {}", chat_id)));
        };

        match self.api.rename_chat(chat_id, name).await {
            Ok(updated) => {
                // Adopt the canonical name in case the server normalized it.
                self.store.lock().unwrap().apply_rename(chat_id, &updated.name);
                Ok(())
            }
            Err(err) => {
                let mut store = self.store.lock().unwrap();
                store.apply_rename(chat_id, &prior);
                store.error = Some(err.user_message());
                Err(err)
            }
        }
    }

    /// Send a user message: append it optimistically together with the
    /// streaming placeholder, then open the send stream.
    pub fn send(&self, content: &str) -> Result<(), ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation("message is empty".to_string()));
        }

        let (chat_id, payload, streaming_id) = {
            let mut store = self.store.lock().unwrap();
            let chat_id = store
                .active_chat_id
                .clone()
                .ok_or_else(|| ChatError::Validation("no active chat".to_string()))?;
            if store.is_sending {
                return Err(ChatError::Validation(
                    "a message is already in flight".to_string(),
                ));
            }

            let user_id = mint_user_id(Utc::now());
            store.push_message(DisplayMessage::user(content, user_id.clone()));
            let streaming_id = mint_streaming_id();
            store.push_message(DisplayMessage::streaming_placeholder(streaming_id.clone()));
            store.begin_stream(streaming_id.clone());

            (chat_id, SendPayload::new(content, user_id), streaming_id)
        };

        let api = self.api.clone();
        let stream_chat = chat_id.clone();
        self.open_chat_stream(
            async move { api.open_send_stream(&stream_chat, &payload).await },
            streaming_id,
        );
        self.record_last_active(&chat_id);
        Ok(())
    }

    /// Start editing a user message: cancel any live stream, drop the
    /// message and everything after it, and return a copy so the embedder
    /// can prefill its input.
    pub fn begin_edit(&self, timestamp: &str) -> Result<DisplayMessage, ChatError> {
        {
            let store = self.store.lock().unwrap();
            let msg = store
                .transcript
                .iter()
                .find(|m| m.timestamp == timestamp)
                .ok_or_else(|| {
                    ChatError::Validation(format!("no message with identity {}", timestamp))
                })?;
            if msg.role != MessageRole::User {
                return Err(ChatError::Validation(
                    "only user messages can be edited".to_string(),
                ));
            }
            if msg.kind != MessageKind::Text {
                return Err(ChatError::Validation(
                    "only text messages can be edited".to_string(),
                ));
            }
            if is_edited_id(timestamp) {
                return Err(ChatError::Validation(
                    "message was already replaced by an edit".to_string(),
                ));
            }
        }

        self.cancel_stream();

        let mut store = self.store.lock().unwrap();
        let msg = store
            .transcript
            .iter()
            .find(|m| m.timestamp == timestamp)
            .cloned()
            .ok_or_else(|| {
                ChatError::Validation(format!("no message with identity {}", timestamp))
            })?;
        store.truncate_from(timestamp);
        store.pending_edit_timestamp = Some(timestamp.to_string());
        Ok(msg)
    }

    /// Abandon an edit started with [`begin_edit`].
    pub fn cancel_edit(&self) {
        self.store.lock().unwrap().pending_edit_timestamp = None;
    }

    /// Complete an edit: append the replacement message and open the edit
    /// stream so the server regenerates from that point.
    pub fn confirm_edit(&self, new_content: &str) -> Result<(), ChatError> {
        let content = new_content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation("message is empty".to_string()));
        }

        let (chat_id, pending, streaming_id) = {
            let mut store = self.store.lock().unwrap();
            let pending = store
                .pending_edit_timestamp
                .clone()
                .ok_or_else(|| ChatError::Validation("no edit in progress".to_string()))?;
            if is_optimistic_id(&pending) {
                return Err(ChatError::Validation(
                    "message is not yet saved and cannot be edited".to_string(),
                ));
            }
            let chat_id = store
                .active_chat_id
                .clone()
                .ok_or_else(|| ChatError::Validation("no active chat".to_string()))?;

            store.truncate_from(&pending);
            store.pending_edit_timestamp = None;

            store.push_message(DisplayMessage::user(content, mint_edited_user_id(Utc::now())));
            let streaming_id = mint_streaming_id();
            store.push_message(DisplayMessage::streaming_placeholder(streaming_id.clone()));
            store.begin_stream(streaming_id.clone());

            (chat_id, pending, streaming_id)
        };

        let payload = EditPayload {
            original_message_timestamp: pending,
            new_content: content.to_string(),
        };
        let api = self.api.clone();
        let stream_chat = chat_id.clone();
        self.open_chat_stream(
            async move { api.open_edit_stream(&stream_chat, &payload).await },
            streaming_id,
        );
        self.record_last_active(&chat_id);
        Ok(())
    }

    /// Cancel the live stream, if any. Partial content is kept; the
    /// streaming identity is forgotten so late events are ignored.
    pub fn cancel_stream(&self) {
        if let Some(handle) = self.stream.lock().unwrap().take() {
            handle.cancel();
        }
        self.store.lock().unwrap().clear_streaming_state();
    }

    /// Tear down before drop: cancels the live stream.
    pub fn shutdown(&self) {
        self.cancel_stream();
    }

    async fn load_transcript(&self, chat_id: &str) -> Result<(), ChatError> {
        self.store.lock().unwrap().is_loading_transcript = true;
        let result = self.api.get_chat(chat_id).await;
        let mut store = self.store.lock().unwrap();
        store.is_loading_transcript = false;
        let detail = result?;
        store.activate_chat(chat_id, detail.into_transcript());
        Ok(())
    }

    /// Wire the reducer into a transport stream and remember the handle.
    ///
    /// Every callback checks the store's streaming identity first: once a
    /// different stream (or a cancellation) has taken over, late events
    /// from this one must not touch the transcript.
    fn open_chat_stream<F>(&self, connect: F, streaming_id: String)
    where
        F: Future<Output = Result<StreamResponse, ChatError>> + Send + 'static,
    {
        let on_event = {
            let store = self.store.clone();
            let streaming_id = streaming_id.clone();
            Box::new(move |event: crate::sse::StreamEvent| {
                let mut store = store.lock().unwrap();
                if store.streaming_message_id.as_deref() != Some(streaming_id.as_str()) {
                    return;
                }
                let applied = reducer::apply(&mut store.transcript, &streaming_id, &event);
                if applied.stream_ended {
                    store.end_stream(applied.session_error);
                }
            })
        };

        let on_error = {
            let store = self.store.clone();
            let streaming_id = streaming_id.clone();
            Box::new(move |err: ChatError| {
                let mut store = store.lock().unwrap();
                if store.streaming_message_id.as_deref() != Some(streaming_id.as_str()) {
                    return;
                }
                store.end_stream(Some(err.user_message()));
                for msg in &mut store.transcript {
                    msg.is_streaming = false;
                }
            })
        };

        let on_close = {
            let store = self.store.clone();
            Box::new(move || {
                let mut store = store.lock().unwrap();
                if store.streaming_message_id.as_deref() != Some(streaming_id.as_str()) {
                    return;
                }
                store.is_sending = false;
                for msg in &mut store.transcript {
                    msg.is_streaming = false;
                }
            })
        };

        let handle = open_stream(
            connect,
            self.config.clone(),
            StreamCallbacks {
                on_event,
                on_error,
                on_close,
            },
        );
        // A naturally ended stream may still hold its connection open (the
        // server kept it alive after stream_end); replacing the handle must
        // cancel it rather than leave the task running until the watchdog.
        if let Some(old) = self.stream.lock().unwrap().replace(handle) {
            old.cancel();
        }
    }

    /// Best-effort recording of the last active chat for resume.
    fn record_last_active(&self, chat_id: &str) {
        let api = self.api.clone();
        let flow_id = self.store.lock().unwrap().flow_id.clone();
        let chat_id = chat_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = api.set_last_active_chat(&flow_id, &chat_id).await {
                tracing::debug!(error = %err, "failed to record last active chat");
            }
        });
    }
}
