//! Transport adapter for the chat stream.
//!
//! [`open_stream`] turns a streaming HTTP response into a sequence of
//! discrete [`StreamEvent`]s delivered to three callbacks, preserving
//! arrival order exactly. It does not interpret event semantics; that is
//! the reducer's job.
//!
//! Contract: for a handle that is never cancelled, exactly one of
//! `on_close` or a terminal `on_error` is eventually invoked. After
//! [`StreamHandle::cancel`], neither fires.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::AbortHandle;
use tokio::time::timeout;

use crate::error::ChatError;
use crate::sse::{SseParser, StreamEvent};
use crate::traits::StreamResponse;

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Watchdog interval: absence of any bytes (including pings) beyond
    /// this is treated as a connectivity error.
    pub idle_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Callbacks wired into one stream.
pub struct StreamCallbacks {
    pub on_event: Box<dyn FnMut(StreamEvent) + Send>,
    pub on_error: Box<dyn FnOnce(ChatError) + Send>,
    pub on_close: Box<dyn FnOnce() + Send>,
}

/// Handle to one open stream; owns its cancellation.
#[derive(Debug)]
pub struct StreamHandle {
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl StreamHandle {
    /// Cancel the stream.
    ///
    /// Synchronous and idempotent: the handle is marked dead immediately
    /// and no callback fires afterwards; the underlying connection closes
    /// asynchronously. Calling twice, or after natural close, is a no-op.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.abort.abort();
            tracing::debug!("stream cancelled");
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Open a stream: resolve `connect` to a streaming response, then
/// demultiplex its bytes into events until it ends, errors, or the handle
/// is cancelled.
pub fn open_stream<F>(connect: F, config: StreamConfig, callbacks: StreamCallbacks) -> StreamHandle
where
    F: Future<Output = Result<StreamResponse, ChatError>> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();

    let task = tokio::spawn(async move {
        run_stream(connect, config, callbacks, flag).await;
    });

    StreamHandle {
        cancelled,
        abort: task.abort_handle(),
    }
}

async fn run_stream<F>(
    connect: F,
    config: StreamConfig,
    callbacks: StreamCallbacks,
    cancelled: Arc<AtomicBool>,
) where
    F: Future<Output = Result<StreamResponse, ChatError>> + Send,
{
    let StreamCallbacks {
        mut on_event,
        on_error,
        on_close,
    } = callbacks;

    let gate = |cancelled: &AtomicBool| !cancelled.load(Ordering::SeqCst);

    let response = match connect.await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "stream failed to open");
            if gate(&cancelled) {
                on_error(err);
            }
            return;
        }
    };

    if !response.is_event_stream() {
        // Non-streaming fallback: a JSON body without a stream marker is
        // already-final output, delivered as one token plus stream_end.
        match read_fallback_body(response).await {
            Ok(text) => {
                if gate(&cancelled) {
                    if !text.is_empty() {
                        on_event(StreamEvent::Token { text });
                    }
                    on_event(StreamEvent::StreamEnd);
                    on_close();
                }
            }
            Err(err) => {
                if gate(&cancelled) {
                    on_error(err);
                }
            }
        }
        return;
    }

    let mut body = response.body;
    let mut parser = SseParser::new();
    // Buffered as raw bytes and decoded per line: a multi-byte character
    // split across network chunks must not be decoded in halves.
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        // Drain complete lines before waiting for more bytes.
        while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
            let mut line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
            line_bytes.pop();
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.pop();
            }
            let line = String::from_utf8_lossy(&line_bytes).into_owned();

            match parser.feed_line(&line) {
                Ok(Some(event)) => {
                    if !gate(&cancelled) {
                        return;
                    }
                    tracing::trace!(event_type = event.event_type_name(), "stream event");
                    on_event(event);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "malformed stream framing");
                    if gate(&cancelled) {
                        on_error(err.into());
                    }
                    return;
                }
            }
        }

        match timeout(config.idle_timeout, body.next()).await {
            Err(_) => {
                if gate(&cancelled) {
                    on_error(ChatError::Connectivity(format!(
                        "no event within {:?}",
                        config.idle_timeout
                    )));
                }
                return;
            }
            Ok(Some(Ok(chunk))) => {
                buffer.extend_from_slice(&chunk);
            }
            Ok(Some(Err(err))) => {
                if gate(&cancelled) {
                    on_error(err.into());
                }
                return;
            }
            Ok(None) => {
                // Stream ended; flush any trailing unterminated line.
                if !buffer.is_empty() {
                    if buffer.last() == Some(&b'\r') {
                        buffer.pop();
                    }
                    let line = String::from_utf8_lossy(&buffer).into_owned();
                    buffer.clear();
                    match parser.feed_line(&line) {
                        Ok(Some(event)) => {
                            if !gate(&cancelled) {
                                return;
                            }
                            on_event(event);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            if gate(&cancelled) {
                                on_error(err.into());
                            }
                            return;
                        }
                    }
                }
                if gate(&cancelled) {
                    on_close();
                }
                return;
            }
        }
    }
}

/// Collect the whole body of a non-SSE response and extract its final text.
async fn read_fallback_body(response: StreamResponse) -> Result<String, ChatError> {
    let mut body = response.body;
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    let text = String::from_utf8_lossy(&bytes).to_string();

    // Prefer the `content` field of a JSON object; otherwise use the body
    // verbatim.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        if let Some(content) = value.get("content").and_then(|v| v.as_str()) {
            return Ok(content.to_string());
        }
        if let Some(s) = value.as_str() {
            return Ok(s.to_string());
        }
    }
    Ok(text)
}
