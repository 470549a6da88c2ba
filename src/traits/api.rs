//! Collaborator API trait.
//!
//! The chat CRUD calls, the last-active-chat lookup, and the send/edit
//! stream endpoints are external collaborators: the engine consumes them
//! through this trait and never builds URLs or payloads itself.

use async_trait::async_trait;

use crate::error::ChatError;
use crate::models::{ChatDetail, ChatSummary, EditPayload, SendPayload};
use crate::traits::StreamResponse;

/// Contract for the backend the engine talks to.
///
/// The default implementation is [`crate::api::HttpChatApi`]; tests swap in
/// mocks. All methods map transport failures to [`ChatError`].
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Create a chat under a flow. The server assigns the id.
    async fn create_chat(
        &self,
        flow_id: &str,
        name: Option<&str>,
    ) -> Result<ChatSummary, ChatError>;

    /// Fetch a chat with its persisted messages.
    async fn get_chat(&self, chat_id: &str) -> Result<ChatDetail, ChatError>;

    /// List chats owned by a flow.
    async fn list_chats(
        &self,
        flow_id: &str,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<ChatSummary>, ChatError>;

    /// Rename a chat.
    async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<ChatSummary, ChatError>;

    /// Delete a chat.
    async fn delete_chat(&self, chat_id: &str) -> Result<(), ChatError>;

    /// Which chat of this flow the user interacted with last, if any.
    async fn last_active_chat(&self, flow_id: &str) -> Result<Option<String>, ChatError>;

    /// Record the last-interacted chat for a flow.
    async fn set_last_active_chat(&self, flow_id: &str, chat_id: &str) -> Result<(), ChatError>;

    /// Open the streaming response for a new user message.
    async fn open_send_stream(
        &self,
        chat_id: &str,
        payload: &SendPayload,
    ) -> Result<StreamResponse, ChatError>;

    /// Open the streaming response for an edit-and-resend. The server
    /// discards the superseded branch.
    async fn open_edit_stream(
        &self,
        chat_id: &str,
        payload: &EditPayload,
    ) -> Result<StreamResponse, ChatError>;
}
