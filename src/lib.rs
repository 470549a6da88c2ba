//! Flowchat - a streaming chat session engine
//!
//! Client-side core for chat frontends talking to a flow-scoped chat
//! backend: session state, SSE stream handling, and the reducer that folds
//! stream events into a renderable transcript.

pub mod adapters;
pub mod api;
pub mod cache;
pub mod engine;
pub mod error;
pub mod models;
pub mod prelude;
pub mod reducer;
pub mod session;
pub mod sse;
pub mod traits;
pub mod transport;
