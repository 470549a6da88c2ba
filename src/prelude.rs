//! Prelude module for convenient imports.
//!
//! Re-exports the types an embedder needs to drive the engine and render
//! its snapshots.
//!
//! # Usage
//!
//! ```ignore
//! use flowchat::prelude::*;
//! ```

// Engine and state
pub use crate::engine::ChatEngine;
pub use crate::session::{SessionSnapshot, SessionStore};

// Model types
pub use crate::models::{
    ChatDetail, ChatSummary, DisplayMessage, EditPayload, MessageKind, MessageRole, SendPayload,
    ToolStatus,
};

// Collaborators
pub use crate::adapters::ReqwestHttpClient;
pub use crate::api::HttpChatApi;
pub use crate::traits::{ChatApi, HttpClient};

// Stream plumbing
pub use crate::sse::StreamEvent;
pub use crate::transport::{StreamConfig, StreamHandle};

// Errors
pub use crate::error::ChatError;
