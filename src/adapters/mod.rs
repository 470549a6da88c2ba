//! Adapter implementations of the collaborator traits.
//!
//! Production adapters live here; `mock` holds the test doubles.

pub mod mock;
mod reqwest_http;

pub use reqwest_http::ReqwestHttpClient;
