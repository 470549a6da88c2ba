//! Mock HTTP client for testing.
//!
//! Provides a configurable mock HTTP client that can return predefined
//! responses, scripted SSE streams, or errors.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::traits::{Headers, HttpClient, HttpError, Response, StreamResponse};

/// A recorded HTTP request for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: String,
    /// Request URL
    pub url: String,
    /// Request body (for POST/PATCH requests)
    pub body: Option<String>,
}

/// Configuration for a mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a buffered response
    Success(Response),
    /// Return an error
    Error(HttpError),
    /// Return a streaming response: content type, chunks, then an optional
    /// trailing error. With `hang` the stream never terminates after its
    /// chunks (for watchdog tests).
    Stream {
        content_type: String,
        chunks: Vec<Bytes>,
        trailing_error: Option<HttpError>,
        hang: bool,
    },
}

impl MockResponse {
    /// Convenience constructor for a well-formed SSE stream.
    pub fn sse(chunks: Vec<&str>) -> Self {
        MockResponse::Stream {
            content_type: "text/event-stream".to_string(),
            chunks: chunks.into_iter().map(|c| Bytes::from(c.to_string())).collect(),
            trailing_error: None,
            hang: false,
        }
    }

    /// Convenience constructor for the non-streaming JSON fallback.
    pub fn json_fallback(body: &str) -> Self {
        MockResponse::Stream {
            content_type: "application/json".to_string(),
            chunks: vec![Bytes::from(body.to_string())],
            trailing_error: None,
            hang: false,
        }
    }
}

/// Mock HTTP client for testing.
///
/// Responses are configured per URL (exact match), optionally narrowed to
/// one method, with an optional default; every request is recorded for
/// verification.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    /// Configured responses by URL, answering any method
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    /// Configured responses by (method, URL); take precedence
    method_responses: Arc<Mutex<HashMap<(String, String), MockResponse>>>,
    /// Default response when no specific match
    default_response: Arc<Mutex<Option<MockResponse>>>,
    /// Recorded requests for verification
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a response for a specific URL (exact match, any method).
    pub fn set_response(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Set a response for one method on a URL. Wins over the method-blind
    /// mapping, so different verbs on the same URL can be scripted apart.
    pub fn set_method_response(&self, method: &str, url: &str, response: MockResponse) {
        self.method_responses
            .lock()
            .unwrap()
            .insert((method.to_string(), url.to_string()), response);
    }

    /// Set a default response for URLs without specific matches.
    pub fn set_default_response(&self, response: MockResponse) {
        *self.default_response.lock().unwrap() = Some(response);
    }

    /// Get all recorded requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get recorded requests for one URL.
    pub fn requests_for(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }

    fn record(&self, method: &str, url: &str, body: Option<&str>) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            body: body.map(|b| b.to_string()),
        });
    }

    fn lookup(&self, method: &str, url: &str) -> Option<MockResponse> {
        self.method_responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), url.to_string()))
            .cloned()
            .or_else(|| self.responses.lock().unwrap().get(url).cloned())
            .or_else(|| self.default_response.lock().unwrap().clone())
    }

    fn buffered(&self, method: &str, url: &str, body: Option<&str>) -> Result<Response, HttpError> {
        self.record(method, url, body);
        match self.lookup(method, url) {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            Some(MockResponse::Stream { .. }) => Err(HttpError::Other(
                "stream response configured for buffered request".to_string(),
            )),
            None => Err(HttpError::Other(format!("no mock response for {}", url))),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str, _headers: &Headers) -> Result<Response, HttpError> {
        self.buffered("GET", url, None)
    }

    async fn post(&self, url: &str, body: &str, _headers: &Headers) -> Result<Response, HttpError> {
        self.buffered("POST", url, Some(body))
    }

    async fn patch(
        &self,
        url: &str,
        body: &str,
        _headers: &Headers,
    ) -> Result<Response, HttpError> {
        self.buffered("PATCH", url, Some(body))
    }

    async fn delete(&self, url: &str, _headers: &Headers) -> Result<Response, HttpError> {
        self.buffered("DELETE", url, None)
    }

    async fn post_stream(
        &self,
        url: &str,
        body: &str,
        _headers: &Headers,
    ) -> Result<StreamResponse, HttpError> {
        self.record("POST", url, Some(body));
        match self.lookup("POST", url) {
            Some(MockResponse::Stream {
                content_type,
                chunks,
                trailing_error,
                hang,
            }) => {
                let items: Vec<Result<Bytes, HttpError>> = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(trailing_error.into_iter().map(Err))
                    .collect();
                let head = stream::iter(items);
                let body: crate::traits::ByteStream = if hang {
                    Box::pin(head.chain(stream::pending()))
                } else {
                    Box::pin(head)
                };
                Ok(StreamResponse {
                    status: 200,
                    content_type: Some(content_type),
                    body,
                })
            }
            Some(MockResponse::Error(err)) => Err(err),
            Some(MockResponse::Success(response)) => Ok(StreamResponse {
                status: response.status,
                content_type: response.headers.get("content-type").cloned(),
                body: Box::pin(stream::once(async move { Ok(response.body) })),
            }),
            None => Err(HttpError::Other(format!("no mock response for {}", url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_with_configured_response() {
        let client = MockHttpClient::new();
        client.set_response(
            "http://test/data",
            MockResponse::Success(Response::new(200, Bytes::from("Hello"))),
        );

        let response = client.get("http://test/data", &Headers::new()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text().unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_unconfigured_url_errors() {
        let client = MockHttpClient::new();
        let result = client.get("http://test/missing", &Headers::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_default_response() {
        let client = MockHttpClient::new();
        client.set_default_response(MockResponse::Success(Response::new(204, Bytes::new())));

        let response = client.get("http://test/anything", &Headers::new()).await.unwrap();
        assert_eq!(response.status, 204);
    }

    #[tokio::test]
    async fn test_error_response() {
        let client = MockHttpClient::new();
        client.set_response(
            "http://test/fail",
            MockResponse::Error(HttpError::ConnectionFailed("refused".to_string())),
        );

        let result = client.post("http://test/fail", "{}", &Headers::new()).await;
        assert_eq!(
            result.unwrap_err(),
            HttpError::ConnectionFailed("refused".to_string())
        );
    }

    #[tokio::test]
    async fn test_requests_recorded() {
        let client = MockHttpClient::new();
        client.set_default_response(MockResponse::Success(Response::new(200, Bytes::new())));

        client.get("http://test/a", &Headers::new()).await.unwrap();
        client
            .post("http://test/b", r#"{"x":1}"#, &Headers::new())
            .await
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[1].url, "http://test/b");
        assert_eq!(requests[1].body.as_deref(), Some(r#"{"x":1}"#));
    }

    #[tokio::test]
    async fn test_sse_stream_chunks() {
        let client = MockHttpClient::new();
        client.set_response(
            "http://test/stream",
            MockResponse::sse(vec!["data: {\"type\":\"stream_end\"}\n\n"]),
        );

        let response = client
            .post_stream("http://test/stream", "{}", &Headers::new())
            .await
            .unwrap();
        assert!(response.is_event_stream());

        let chunks: Vec<_> = response.body.collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_ok());
    }

    #[tokio::test]
    async fn test_stream_trailing_error() {
        let client = MockHttpClient::new();
        client.set_response(
            "http://test/stream",
            MockResponse::Stream {
                content_type: "text/event-stream".to_string(),
                chunks: vec![Bytes::from("data: \"x\"\n\n")],
                trailing_error: Some(HttpError::Io("reset".to_string())),
                hang: false,
            },
        );

        let response = client
            .post_stream("http://test/stream", "{}", &Headers::new())
            .await
            .unwrap();
        let chunks: Vec<_> = response.body.collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].is_err());
    }

    #[tokio::test]
    async fn test_hanging_stream_yields_chunks_then_stays_open() {
        let client = MockHttpClient::new();
        client.set_response(
            "http://test/stream",
            MockResponse::Stream {
                content_type: "text/event-stream".to_string(),
                chunks: vec![Bytes::from("data: \"x\"\n\n")],
                trailing_error: None,
                hang: true,
            },
        );

        let response = client
            .post_stream("http://test/stream", "{}", &Headers::new())
            .await
            .unwrap();
        let mut body = response.body;

        let first = body.next().await;
        assert!(matches!(first, Some(Ok(_))));

        // The stream must not terminate after its scripted chunks.
        let next = tokio::time::timeout(std::time::Duration::from_millis(50), body.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_method_response_wins_over_url_response() {
        let client = MockHttpClient::new();
        client.set_response(
            "http://test/item",
            MockResponse::Success(Response::new(200, Bytes::from("get body"))),
        );
        client.set_method_response(
            "PATCH",
            "http://test/item",
            MockResponse::Error(HttpError::ConnectionFailed("refused".to_string())),
        );

        let get = client.get("http://test/item", &Headers::new()).await.unwrap();
        assert_eq!(get.text().unwrap(), "get body");

        let patch = client.patch("http://test/item", "{}", &Headers::new()).await;
        assert_eq!(
            patch.unwrap_err(),
            HttpError::ConnectionFailed("refused".to_string())
        );
    }

    #[tokio::test]
    async fn test_json_fallback_content_type() {
        let client = MockHttpClient::new();
        client.set_response(
            "http://test/stream",
            MockResponse::json_fallback(r#"{"content":"final"}"#),
        );

        let response = client
            .post_stream("http://test/stream", "{}", &Headers::new())
            .await
            .unwrap();
        assert!(!response.is_event_stream());
    }
}
