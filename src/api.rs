//! Backend API client.
//!
//! Thin wrappers over the REST and streaming endpoints, implementing the
//! [`ChatApi`] collaborator contract. Chat-list and last-active lookups
//! are memoized through a time-bounded cache.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};

use chrono::Duration as ChronoDuration;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::error::ChatError;
use crate::models::{ChatDetail, ChatSummary, EditPayload, SendPayload};
use crate::traits::{ChatApi, Headers, HttpClient, Response, StreamResponse};

/// How long memoized list/last-active responses stay fresh.
const CACHE_TTL_SECS: i64 = 30;

/// Backend client over any [`HttpClient`].
pub struct HttpChatApi<C: HttpClient> {
    http: Arc<C>,
    base_url: String,
    list_cache: Mutex<TtlCache<String, Vec<ChatSummary>>>,
    last_active_cache: Mutex<TtlCache<String, Option<String>>>,
}

impl<C: HttpClient> HttpChatApi<C> {
    /// Create a client for the given base URL.
    pub fn new(http: Arc<C>, base_url: impl Into<String>) -> Self {
        Self::with_clock(http, base_url, Arc::new(SystemClock))
    }

    /// Create a client with an injected cache clock.
    pub fn with_clock(http: Arc<C>, base_url: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let ttl = ChronoDuration::seconds(CACHE_TTL_SECS);
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            list_cache: Mutex::new(TtlCache::with_clock(ttl, clock.clone())),
            last_active_cache: Mutex::new(TtlCache::with_clock(ttl, clock)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn json_headers() -> Headers {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers
    }

    fn stream_headers() -> Headers {
        let mut headers = Self::json_headers();
        headers.insert("Accept".to_string(), "text/event-stream".to_string());
        headers
    }

    /// Map a non-2xx buffered response to a server error, preferring the
    /// `detail` field the backend puts in error bodies.
    fn check(response: Response) -> Result<Response, ChatError> {
        if response.is_success() {
            return Ok(response);
        }
        Err(ChatError::Server(Self::error_body(
            response.status,
            &response.body,
        )))
    }

    fn error_body(status: u16, body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or_else(|| text.trim().to_string());
        if message.is_empty() {
            format!("request failed with status {}", status)
        } else {
            format!("{} ({})", message, status)
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(response: &Response) -> Result<T, ChatError> {
        response
            .json()
            .map_err(|e| ChatError::Protocol(format!("invalid response body: {}", e)))
    }

    async fn open_stream_checked(
        &self,
        url: &str,
        body: String,
    ) -> Result<StreamResponse, ChatError> {
        let response = self
            .http
            .post_stream(url, &body, &Self::stream_headers())
            .await?;

        if response.is_success() {
            return Ok(response);
        }

        // Drain the error body so the status line carries its message.
        let status = response.status;
        let mut stream = response.body;
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(b) => bytes.extend_from_slice(&b),
                Err(_) => break,
            }
        }
        Err(ChatError::Server(Self::error_body(status, &bytes)))
    }

    fn list_key(flow_id: &str, skip: u32, limit: u32) -> String {
        format!("{}:{}:{}", flow_id, skip, limit)
    }
}

#[async_trait]
impl<C: HttpClient> ChatApi for HttpChatApi<C> {
    async fn create_chat(
        &self,
        flow_id: &str,
        name: Option<&str>,
    ) -> Result<ChatSummary, ChatError> {
        let url = self.url(&format!("/v1/flows/{}/chats", flow_id));
        let body = match name {
            Some(name) => serde_json::json!({ "name": name }).to_string(),
            None => "{}".to_string(),
        };

        let response = Self::check(self.http.post(&url, &body, &Self::json_headers()).await?)?;
        let summary: ChatSummary = Self::decode(&response)?;

        self.list_cache.lock().unwrap().clear();
        tracing::debug!(chat_id = %summary.id, %flow_id, "chat created");
        Ok(summary)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatDetail, ChatError> {
        let url = self.url(&format!("/v1/chats/{}", chat_id));
        let response = Self::check(self.http.get(&url, &Headers::new()).await?)?;
        Self::decode(&response)
    }

    async fn list_chats(
        &self,
        flow_id: &str,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<ChatSummary>, ChatError> {
        let key = Self::list_key(flow_id, skip, limit);
        if let Some(cached) = self.list_cache.lock().unwrap().get(&key) {
            return Ok(cached);
        }

        let url = self.url(&format!(
            "/v1/flows/{}/chats?skip={}&limit={}",
            flow_id, skip, limit
        ));
        let response = Self::check(self.http.get(&url, &Headers::new()).await?)?;
        let chats: Vec<ChatSummary> = Self::decode(&response)?;

        self.list_cache.lock().unwrap().put(key, chats.clone());
        Ok(chats)
    }

    async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<ChatSummary, ChatError> {
        let url = self.url(&format!("/v1/chats/{}", chat_id));
        let body = serde_json::json!({ "name": name }).to_string();

        let response = Self::check(self.http.patch(&url, &body, &Self::json_headers()).await?)?;
        let summary: ChatSummary = Self::decode(&response)?;

        self.list_cache.lock().unwrap().clear();
        Ok(summary)
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ChatError> {
        let url = self.url(&format!("/v1/chats/{}", chat_id));
        Self::check(self.http.delete(&url, &Headers::new()).await?)?;

        self.list_cache.lock().unwrap().clear();
        tracing::debug!(%chat_id, "chat deleted");
        Ok(())
    }

    async fn last_active_chat(&self, flow_id: &str) -> Result<Option<String>, ChatError> {
        let key = flow_id.to_string();
        if let Some(cached) = self.last_active_cache.lock().unwrap().get(&key) {
            return Ok(cached);
        }

        let url = self.url(&format!("/v1/flows/{}/last-chat", flow_id));
        let response = Self::check(self.http.get(&url, &Headers::new()).await?)?;
        let value: serde_json::Value = Self::decode(&response)?;
        let chat_id = value
            .get("chat_id")
            .and_then(|v| v.as_str())
            .map(String::from);

        self.last_active_cache
            .lock()
            .unwrap()
            .put(key, chat_id.clone());
        Ok(chat_id)
    }

    async fn set_last_active_chat(&self, flow_id: &str, chat_id: &str) -> Result<(), ChatError> {
        let url = self.url(&format!("/v1/flows/{}/last-chat", flow_id));
        let body = serde_json::json!({ "chat_id": chat_id }).to_string();

        Self::check(self.http.post(&url, &body, &Self::json_headers()).await?)?;

        self.last_active_cache
            .lock()
            .unwrap()
            .put(flow_id.to_string(), Some(chat_id.to_string()));
        Ok(())
    }

    async fn open_send_stream(
        &self,
        chat_id: &str,
        payload: &SendPayload,
    ) -> Result<StreamResponse, ChatError> {
        let url = self.url(&format!("/v1/chats/{}/stream", chat_id));
        let body = serde_json::to_string(payload)
            .map_err(|e| ChatError::Validation(format!("unserializable payload: {}", e)))?;
        self.open_stream_checked(&url, body).await
    }

    async fn open_edit_stream(
        &self,
        chat_id: &str,
        payload: &EditPayload,
    ) -> Result<StreamResponse, ChatError> {
        let url = self.url(&format!("/v1/chats/{}/stream/edit", chat_id));
        let body = serde_json::to_string(payload)
            .map_err(|e| ChatError::Validation(format!("unserializable payload: {}", e)))?;
        self.open_stream_checked(&url, body).await
    }
}
