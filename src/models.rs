use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Summary of one chat session owned by a flow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSummary {
    /// Unique identifier from the backend; immutable once created
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// When the chat was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// When the chat was last updated
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// What a transcript entry represents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary text message
    Text,
    /// Narration of a server-side tool invocation
    ToolStatus,
    /// Server-persisted error entry (hydration only)
    Error,
}

/// Lifecycle state of a tool invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Completed,
    Error,
}

/// One entry in a chat transcript.
///
/// `timestamp` doubles as the stable identity key and must stay unique
/// within a transcript. Optimistic user messages carry a client-minted
/// `user-<millis>` identity until the server acknowledges persistence and
/// the identity is rewritten in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayMessage {
    pub role: MessageRole,
    pub content: String,
    /// Identity key, unique within a transcript at all times
    pub timestamp: String,
    pub kind: MessageKind,
    /// True for the single in-flight assistant message
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_status: Option<ToolStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_error_message: Option<String>,
}

impl DisplayMessage {
    /// Build a plain text message.
    pub fn text(role: MessageRole, content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: timestamp.into(),
            kind: MessageKind::Text,
            is_streaming: false,
            tool_name: None,
            tool_input: None,
            tool_output_summary: None,
            tool_status: None,
            tool_error_message: None,
        }
    }

    /// Build an optimistic user message with a client-minted identity.
    pub fn user(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content, timestamp)
    }

    /// Build the empty assistant placeholder that tokens stream into.
    pub fn streaming_placeholder(streaming_id: impl Into<String>) -> Self {
        let mut msg = Self::text(MessageRole::Assistant, "", streaming_id);
        msg.is_streaming = true;
        msg
    }

    /// Build a running tool-status message with a fresh identity.
    pub fn tool_running(name: impl Into<String>, input: Value) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            timestamp: mint_tool_id(),
            kind: MessageKind::ToolStatus,
            is_streaming: false,
            tool_name: Some(name.into()),
            tool_input: Some(input),
            tool_output_summary: None,
            tool_status: Some(ToolStatus::Running),
            tool_error_message: None,
        }
    }

    /// Append a streamed token fragment.
    pub fn append_token(&mut self, text: &str) {
        self.content.push_str(text);
        self.is_streaming = true;
    }

    /// Mark a running tool invocation as completed.
    pub fn complete_tool(&mut self, output_summary: impl Into<String>) {
        self.tool_status = Some(ToolStatus::Completed);
        self.tool_output_summary = Some(output_summary.into());
    }

    /// Mark a running tool invocation as failed.
    pub fn fail_tool(&mut self, error: impl Into<String>) {
        self.tool_status = Some(ToolStatus::Error);
        self.tool_error_message = Some(error.into());
    }
}

/// Mint the identity for an optimistic user message.
pub fn mint_user_id(now: DateTime<Utc>) -> String {
    format!("user-{}", now.timestamp_millis())
}

/// Mint the identity for the user message replacing an edited one.
pub fn mint_edited_user_id(now: DateTime<Utc>) -> String {
    format!("user-edited-{}", now.timestamp_millis())
}

/// Mint the identity reused for the lifetime of one assistant stream.
pub fn mint_streaming_id() -> String {
    format!("assistant-{}", Uuid::new_v4())
}

/// Mint the identity for a tool-status message.
pub fn mint_tool_id() -> String {
    format!("tool-{}", Uuid::new_v4())
}

/// True while a message identity is client-minted and not yet confirmed
/// by the server. Edits cannot target such messages.
pub fn is_optimistic_id(timestamp: &str) -> bool {
    timestamp.starts_with("user-")
}

/// True for identities minted by an earlier edit-and-resend.
pub fn is_edited_id(timestamp: &str) -> bool {
    timestamp.starts_with("user-edited-")
}

/// Body of the send endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendPayload {
    pub content: String,
    pub role: MessageRole,
    pub client_message_id: String,
}

impl SendPayload {
    pub fn new(content: impl Into<String>, client_message_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: MessageRole::User,
            client_message_id: client_message_id.into(),
        }
    }
}

/// Body of the edit-and-resend endpoint. The server discards the
/// superseded branch starting at `original_message_timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EditPayload {
    pub original_message_timestamp: String,
    pub new_content: String,
}

/// A message as persisted by the backend, used when hydrating a transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    pub timestamp: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub tool_output_summary: Option<String>,
    #[serde(default)]
    pub tool_status: Option<ToolStatus>,
    #[serde(default)]
    pub tool_error_message: Option<String>,
}

impl From<ServerMessage> for DisplayMessage {
    fn from(msg: ServerMessage) -> Self {
        let kind = msg.kind.unwrap_or(if msg.tool_name.is_some() {
            MessageKind::ToolStatus
        } else {
            MessageKind::Text
        });
        DisplayMessage {
            role: msg.role,
            content: msg.content,
            timestamp: msg.timestamp,
            kind,
            is_streaming: false,
            tool_name: msg.tool_name,
            tool_input: msg.tool_input,
            tool_output_summary: msg.tool_output_summary,
            tool_status: msg.tool_status,
            tool_error_message: msg.tool_error_message,
        }
    }
}

/// Response of the chat detail endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatDetail {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<ServerMessage>,
}

impl ChatDetail {
    /// Hydrate the server messages into transcript entries.
    pub fn into_transcript(self) -> Vec<DisplayMessage> {
        self.messages.into_iter().map(DisplayMessage::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_summary_deserialization_defaults() {
        let summary: ChatSummary = serde_json::from_str(r#"{"id": "chat-1"}"#).unwrap();
        assert_eq!(summary.id, "chat-1");
        assert!(summary.name.is_empty());
    }

    #[test]
    fn test_display_message_user() {
        let msg = DisplayMessage::user("hello", "user-1700000000000");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.content, "hello");
        assert!(!msg.is_streaming);
    }

    #[test]
    fn test_streaming_placeholder() {
        let msg = DisplayMessage::streaming_placeholder("assistant-abc");
        assert_eq!(msg.role, MessageRole::Assistant);
        assert!(msg.is_streaming);
        assert!(msg.content.is_empty());
        assert_eq!(msg.timestamp, "assistant-abc");
    }

    #[test]
    fn test_tool_running_has_fresh_identity() {
        let a = DisplayMessage::tool_running("search", json!({}));
        let b = DisplayMessage::tool_running("search", json!({}));
        assert_ne!(a.timestamp, b.timestamp);
        assert_eq!(a.tool_status, Some(ToolStatus::Running));
        assert_eq!(a.kind, MessageKind::ToolStatus);
    }

    #[test]
    fn test_append_token_marks_streaming() {
        let mut msg = DisplayMessage::text(MessageRole::Assistant, "Hel", "assistant-1");
        msg.append_token("lo");
        assert_eq!(msg.content, "Hello");
        assert!(msg.is_streaming);
    }

    #[test]
    fn test_complete_tool() {
        let mut msg = DisplayMessage::tool_running("search", json!({"q": "rust"}));
        msg.complete_tool("3 results");
        assert_eq!(msg.tool_status, Some(ToolStatus::Completed));
        assert_eq!(msg.tool_output_summary.as_deref(), Some("3 results"));
    }

    #[test]
    fn test_fail_tool() {
        let mut msg = DisplayMessage::tool_running("search", json!({}));
        msg.fail_tool("timed out");
        assert_eq!(msg.tool_status, Some(ToolStatus::Error));
        assert_eq!(msg.tool_error_message.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_mint_user_ids() {
        let now = Utc::now();
        let id = mint_user_id(now);
        assert!(id.starts_with("user-"));
        assert!(is_optimistic_id(&id));
        assert!(!is_edited_id(&id));

        let edited = mint_edited_user_id(now);
        assert!(edited.starts_with("user-edited-"));
        assert!(is_optimistic_id(&edited));
        assert!(is_edited_id(&edited));
    }

    #[test]
    fn test_server_timestamp_is_not_optimistic() {
        assert!(!is_optimistic_id("2024-01-15T10:00:00Z"));
    }

    #[test]
    fn test_mint_streaming_id_unique() {
        assert_ne!(mint_streaming_id(), mint_streaming_id());
    }

    #[test]
    fn test_send_payload_serialization() {
        let payload = SendPayload::new("hi", "user-123");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["content"], "hi");
        assert_eq!(json["role"], "user");
        assert_eq!(json["client_message_id"], "user-123");
    }

    #[test]
    fn test_server_message_hydration_infers_tool_kind() {
        let msg = ServerMessage {
            timestamp: "t1".to_string(),
            role: MessageRole::Assistant,
            content: String::new(),
            kind: None,
            tool_name: Some("search".to_string()),
            tool_input: None,
            tool_output_summary: Some("done".to_string()),
            tool_status: Some(ToolStatus::Completed),
            tool_error_message: None,
        };
        let display: DisplayMessage = msg.into();
        assert_eq!(display.kind, MessageKind::ToolStatus);
        assert!(!display.is_streaming);
    }

    #[test]
    fn test_chat_detail_into_transcript() {
        let detail: ChatDetail = serde_json::from_value(json!({
            "id": "chat-1",
            "messages": [
                {"timestamp": "t1", "role": "user", "content": "hi"},
                {"timestamp": "t2", "role": "assistant", "content": "hello"}
            ]
        }))
        .unwrap();

        let transcript = detail.into_transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, MessageRole::User);
        assert_eq!(transcript[1].content, "hello");
    }

    #[test]
    fn test_display_message_round_trip() {
        let msg = DisplayMessage::tool_running("search", json!({"q": 1}));
        let json = serde_json::to_string(&msg).unwrap();
        let back: DisplayMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
