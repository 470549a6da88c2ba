//! Integration tests for the HTTP API client against a real server.
//!
//! These exercise the reqwest adapter, the API client, and the transport
//! together over the wire, including the SSE streaming endpoint and the
//! non-streaming JSON fallback.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowchat::adapters::ReqwestHttpClient;
use flowchat::api::HttpChatApi;
use flowchat::error::ChatError;
use flowchat::models::SendPayload;
use flowchat::sse::StreamEvent;
use flowchat::traits::ChatApi;
use flowchat::transport::{open_stream, StreamCallbacks, StreamConfig};

fn api(server: &MockServer) -> HttpChatApi<ReqwestHttpClient> {
    HttpChatApi::new(Arc::new(ReqwestHttpClient::new()), server.uri())
}

fn chat_body(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "created_at": "2024-01-15T10:00:00Z",
        "updated_at": "2024-01-15T10:00:00Z",
    })
}

#[tokio::test]
async fn test_list_chats_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/flows/flow-1/chats"))
        .and(query_param("skip", "0"))
        .and(query_param("limit", "50"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([chat_body("chat-1", "First")])),
        )
        .mount(&server)
        .await;

    let chats = api(&server).list_chats("flow-1", 0, 50).await.unwrap();

    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].id, "chat-1");
    assert_eq!(chats[0].name, "First");
}

#[tokio::test]
async fn test_create_and_rename_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/flows/flow-1/chats"))
        .respond_with(ResponseTemplate::new(201).set_body_json(chat_body("chat-2", "New chat")))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1/chats/chat-2"))
        .and(body_string_contains("Renamed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("chat-2", "Renamed")))
        .mount(&server)
        .await;

    let api = api(&server);
    let created = api.create_chat("flow-1", None).await.unwrap();
    assert_eq!(created.id, "chat-2");

    let renamed = api.rename_chat("chat-2", "Renamed").await.unwrap();
    assert_eq!(renamed.name, "Renamed");
}

#[tokio::test]
async fn test_delete_chat() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/chats/chat-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    api(&server).delete_chat("chat-1").await.unwrap();
}

#[tokio::test]
async fn test_server_error_carries_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/chats/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "chat not found"})),
        )
        .mount(&server)
        .await;

    let err = api(&server).get_chat("missing").await.unwrap_err();

    assert_eq!(err, ChatError::Server("chat not found (404)".to_string()));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unreachable_server_is_retryable() {
    // Port 1 is never listening.
    let api = HttpChatApi::new(Arc::new(ReqwestHttpClient::new()), "http://127.0.0.1:1");

    let err = api.list_chats("flow-1", 0, 50).await.unwrap_err();

    assert!(matches!(err, ChatError::Connectivity(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_last_active_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/flows/flow-1/last-chat"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"chat_id": "chat-7"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/flows/flow-1/last-chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let api = api(&server);
    assert_eq!(
        api.last_active_chat("flow-1").await.unwrap(),
        Some("chat-7".to_string())
    );
    api.set_last_active_chat("flow-1", "chat-8").await.unwrap();
}

/// Collect every event from one stream and wait for its close.
async fn collect_stream(
    api: HttpChatApi<ReqwestHttpClient>,
    chat_id: &str,
) -> (Vec<StreamEvent>, Option<ChatError>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let error = Arc::new(Mutex::new(None));
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let (err_tx, err_rx) = tokio::sync::oneshot::channel::<()>();

    let payload = SendPayload::new("hello", "user-1");
    let chat_id = chat_id.to_string();
    let connect = async move { api.open_send_stream(&chat_id, &payload).await };

    let sink = events.clone();
    let err_sink = error.clone();
    open_stream(
        connect,
        StreamConfig::default(),
        StreamCallbacks {
            on_event: Box::new(move |event| sink.lock().unwrap().push(event)),
            on_error: Box::new(move |err| {
                *err_sink.lock().unwrap() = Some(err);
                let _ = err_tx.send(());
            }),
            on_close: Box::new(move || {
                let _ = done_tx.send(());
            }),
        },
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        tokio::select! {
            _ = done_rx => {}
            _ = err_rx => {}
        }
    })
    .await
    .expect("stream did not finish");

    let events = events.lock().unwrap().clone();
    let error = error.lock().unwrap().clone();
    (events, error)
}

#[tokio::test]
async fn test_send_stream_event_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"type\":\"token\",\"data\":\"Hel\"}\n\n",
        "data: {\"type\":\"tool_start\",\"data\":{\"name\":\"search\",\"input\":{\"q\":\"x\"}}}\n\n",
        "data: {\"type\":\"tool_end\",\"data\":{\"name\":\"search\",\"output_summary\":\"3 hits\"}}\n\n",
        "data: {\"type\":\"token\",\"data\":\"lo\"}\n\n",
        "data: {\"type\":\"stream_end\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chats/chat-1/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let (events, error) = collect_stream(api(&server), "chat-1").await;

    assert!(error.is_none());
    assert_eq!(events.len(), 5);
    assert_eq!(
        events[0],
        StreamEvent::Token {
            text: "Hel".to_string()
        }
    );
    assert!(matches!(&events[1], StreamEvent::ToolStart { name, .. } if name == "search"));
    assert!(matches!(&events[2], StreamEvent::ToolEnd { name, .. } if name == "search"));
    assert_eq!(
        events[3],
        StreamEvent::Token {
            text: "lo".to_string()
        }
    );
    assert_eq!(events[4], StreamEvent::StreamEnd);
}

#[tokio::test]
async fn test_json_fallback_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chats/chat-1/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"content":"already final"}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let (events, error) = collect_stream(api(&server), "chat-1").await;

    assert!(error.is_none());
    assert_eq!(
        events,
        vec![
            StreamEvent::Token {
                text: "already final".to_string()
            },
            StreamEvent::StreamEnd,
        ]
    );
}

#[tokio::test]
async fn test_stream_endpoint_failure_is_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chats/chat-1/stream"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(serde_json::json!({"detail": "agent unavailable"})),
        )
        .mount(&server)
        .await;

    let (events, error) = collect_stream(api(&server), "chat-1").await;

    assert!(events.is_empty());
    assert_eq!(
        error,
        Some(ChatError::Server("agent unavailable (503)".to_string()))
    );
}
