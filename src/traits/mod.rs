//! Trait abstractions for external collaborators.
//!
//! These traits are the engine's dependency-injection seams: the HTTP
//! transport and the backend API are consumed through them, with
//! production adapters in `crate::adapters` / `crate::api` and mocks for
//! tests.

mod api;
mod http;

pub use api::ChatApi;
pub use http::{ByteStream, Headers, HttpClient, HttpError, Response, StreamResponse};
