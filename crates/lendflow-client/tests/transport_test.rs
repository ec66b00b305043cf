//! Transports against a throwaway local server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use lendflow_client::{
    ChatClient, ClientConfig, ClientError, MemoryContextStore, ReconnectPolicy, SessionContext,
    SseTransport, TransportKind, WsSession,
};
use lendflow_types::{ChatEvent, ChatRequest, NewMessage, Role};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const SPLIT_STREAM: [&str; 6] = [
    "data: {\"type\":\"ack\"}\n\ndata: {\"type\":\"content_st",
    "art\"}\n\n",
    "data: {\"type\":\"content\",\"data\":\"Your EMI \"}\n\n: keep-alive\n\n",
    "data: {\"type\":\"content\",\"data\":\"is 12000\"}\n\ndata: {broken\n\n",
    "data: {\"type\":\"done\"}\n\n",
    "data: {\"type\":\"content\",\"data\":\"trail",
];

async fn sse_handler() -> Response {
    let chunks = SPLIT_STREAM
        .iter()
        .map(|chunk| Ok::<_, std::convert::Infallible>(Bytes::from_static(chunk.as_bytes())));
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap()
}

/// A whole reply in one network chunk
const SINGLE_CHUNK: &str = "data: {\"type\":\"content_start\"}\n\n\
data: {\"type\":\"content\",\"data\":\"Hi\"}\n\n\
data: {\"type\":\"done\"}\n\n";

async fn single_chunk_handler() -> Response {
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from(SINGLE_CHUNK))
        .unwrap()
}

async fn slow_sse_handler() -> Response {
    let chunks = async_stream::stream! {
        let first = Bytes::from_static(b"data: {\"type\":\"content_start\"}\n\n");
        yield Ok::<_, std::convert::Infallible>(first);
        tokio::time::sleep(Duration::from_secs(30)).await;
        yield Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n\n"));
    };
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

/// `drop` → connection dies mid-turn; anything else → a short answer
async fn handle_socket(mut socket: WebSocket) {
    while let Some(Ok(WsMessage::Text(text))) = socket.recv().await {
        let request: ChatRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(_) => return,
        };

        let mut events = vec![ChatEvent::ack(), ChatEvent::ContentStart { message_id: None }];
        if request.message == "drop" {
            for event in events {
                let _ = socket.send(WsMessage::Text(serde_json::to_string(&event).unwrap())).await;
            }
            return;
        }

        events.push(ChatEvent::content("Hi"));
        events.push(ChatEvent::Done { message_id: None });
        for event in events {
            if socket
                .send(WsMessage::Text(serde_json::to_string(&event).unwrap()))
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

/// Roles of appended messages in arrival order
type AppendLog = Arc<Mutex<Vec<Role>>>;

/// Session Directory append; user rows are slow to land
async fn append_handler(
    State(log): State<AppendLog>,
    Path(session_id): Path<String>,
    Json(message): Json<NewMessage>,
) -> impl IntoResponse {
    if message.role == Role::User {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    log.lock().unwrap().push(message.role);
    let stored = json!({
        "id": format!("{}-{}", session_id, message.role.as_str()),
        "role": message.role,
        "content": message.content,
        "created_at": "2024-01-01T00:00:00Z",
    });
    (StatusCode::CREATED, Json(stored))
}

async fn spawn_server() -> (String, AppendLog) {
    let log = AppendLog::default();
    let app = Router::new()
        .route("/chat/stream", get(sse_handler))
        .route("/chat/sessions/:session_id/messages", post(append_handler))
        .route("/slow/chat/stream", get(slow_sse_handler))
        .route("/cancel/chat/stream", get(single_chunk_handler))
        .route("/cancel/chat/sessions/:session_id/messages", post(append_handler))
        .route("/ws/chat", get(ws_handler))
        .with_state(Arc::clone(&log));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), log)
}

fn sse_client(base: String, session_id: &str) -> ChatClient {
    ChatClient::new(
        ClientConfig::new(base),
        SessionContext::new(session_id),
        Arc::new(MemoryContextStore::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_sse_transport_reassembles_split_frames() {
    let (base, _) = spawn_server().await;
    let transport = SseTransport::new(base);

    let events: Vec<ChatEvent> = transport
        .stream_turn(&ChatRequest::new("emi?"), CancellationToken::new())
        .map(|item| item.unwrap())
        .collect()
        .await;

    let kinds: Vec<_> = events.iter().map(ChatEvent::kind).collect();
    assert_eq!(kinds, vec!["ack", "content_start", "content", "content", "done"]);
}

#[tokio::test]
async fn test_sse_cancellation_stops_stream() {
    let (base, _) = spawn_server().await;
    let transport = SseTransport::new(format!("{}/slow", base));
    let cancel = CancellationToken::new();

    let mut events = transport.stream_turn(&ChatRequest::new("hi"), cancel.clone());
    let first = events.next().await.unwrap().unwrap();
    assert_eq!(first, ChatEvent::ContentStart { message_id: None });

    cancel.cancel();
    let next = tokio::time::timeout(Duration::from_secs(2), events.next())
        .await
        .expect("cancelled stream should end promptly");
    assert!(next.is_none());
}

#[tokio::test]
async fn test_sse_http_error_is_reported() {
    let (base, _) = spawn_server().await;
    let transport = SseTransport::new(format!("{}/missing", base));

    let first = transport
        .stream_turn(&ChatRequest::new("hi"), CancellationToken::new())
        .next()
        .await
        .unwrap();
    assert!(matches!(first, Err(ClientError::Status { status: 404, .. })));
}

#[tokio::test]
async fn test_ws_drop_mid_turn_then_reconnect() {
    let (base, _) = spawn_server().await;
    let mut session = WsSession::new(&base, "s1", ReconnectPolicy::default()).unwrap();

    session.send_turn(&ChatRequest::new("drop")).await.unwrap();
    assert_eq!(session.next_event().await.unwrap(), ChatEvent::ack());
    assert!(matches!(session.next_event().await.unwrap(), ChatEvent::ContentStart { .. }));
    assert!(matches!(
        session.next_event().await,
        Err(ClientError::ConnectionLost(_))
    ));
    assert!(!session.is_connected());

    session.send_turn(&ChatRequest::new("again")).await.unwrap();
    let mut kinds = Vec::new();
    loop {
        let event = session.next_event().await.unwrap();
        kinds.push(event.kind());
        if event.is_terminal() {
            break;
        }
    }
    assert_eq!(kinds, vec!["ack", "content_start", "content", "done"]);
    session.close().await;
}

#[tokio::test]
async fn test_chat_client_surfaces_connection_loss_as_error_message() {
    let (base, _) = spawn_server().await;
    let config = ClientConfig::new(base)
        .with_transport(TransportKind::WebSocket)
        .with_persist(false);
    let mut client = ChatClient::new(
        config,
        SessionContext::new("s1"),
        Arc::new(MemoryContextStore::new()),
    )
    .unwrap();

    client.send("drop", |_, _| {}).await.unwrap();
    let last = client.reducer().last_message().unwrap();
    assert!(last.content.starts_with("Error:"));
    assert!(!last.is_streaming);
    assert!(!client.reducer().is_loading());

    let mut seen = Vec::new();
    client
        .send("hello", |_, event| seen.push(event.kind()))
        .await
        .unwrap();
    assert_eq!(seen, vec!["ack", "content_start", "content", "done"]);

    let messages = client.reducer().messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3].role, Role::Assistant);
    assert_eq!(messages[3].content, "Hi");
    client.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_turn_applies_nothing_further() {
    let (base, log) = spawn_server().await;
    let mut client = sse_client(format!("{}/cancel", base), "s1");
    let canceller = client.canceller();

    let mut seen = Vec::new();
    client
        .send("hello", |_, event| {
            seen.push(event.kind());
            if matches!(event, ChatEvent::ContentStart { .. }) {
                assert!(canceller.cancel());
            }
        })
        .await
        .unwrap();
    client.flush().await;

    // content and done arrived in the same chunk but were never applied
    assert_eq!(seen, vec!["content_start"]);
    let last = client.reducer().last_message().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, "");
    assert!(!last.is_streaming);
    assert!(!client.reducer().is_loading());
    assert!(!canceller.is_turn_active());

    assert_eq!(*log.lock().unwrap(), vec![Role::User]);
}

#[tokio::test]
async fn test_persisted_rows_keep_turn_order() {
    let (base, log) = spawn_server().await;
    let mut client = sse_client(base, "s1");

    client.send("emi?", |_, _| {}).await.unwrap();
    client.flush().await;

    assert_eq!(client.reducer().messages().len(), 2);
    assert_eq!(*log.lock().unwrap(), vec![Role::User, Role::Assistant]);
}
