use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use lendflow_types::{ChatEvent, ChatRequest, DEFAULT_SESSION_ID};
use serde::Deserialize;
use std::sync::Arc;

use crate::{handlers::turn_input, state::AppState};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

/// Bidirectional chat socket
///
/// The client sends `{message, customer_id?, customer_name?}` frames; the
/// server answers each with a full event sequence. Turns on one connection
/// run strictly one after another.
#[utoipa::path(
    get,
    path = "/ws/chat",
    params(
        ("session_id" = Option<String>, Query, description = "Session id (default: default_session)")
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol")
    ),
    tag = "chat"
)]
pub async fn chat_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let connection_id = state.connections.register(&session_id);
    tracing::info!(session_id = %session_id, "WebSocket connected");

    while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(session_id = %session_id, "WebSocket receive failed: {}", e);
                break;
            }
        };

        let request: ChatRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "Malformed chat frame: {}", e);
                if send_event(&mut socket, &ChatEvent::error("Invalid message frame"))
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }
        };

        let input = match turn_input(
            &session_id,
            &request.message,
            request.customer_id,
            request.customer_name,
        ) {
            Ok(input) => input,
            Err(error) => {
                if send_event(&mut socket, &error).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let mut events = state.producer.spawn_turn(input);
        let mut client_gone = false;
        while let Some(event) = events.recv().await {
            if send_event(&mut socket, &event).await.is_err() {
                // Dropping the receiver lets the producer wind down on its own
                client_gone = true;
                break;
            }
        }
        if client_gone {
            break;
        }
    }

    state.connections.unregister(&session_id, connection_id);
    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

async fn send_event(socket: &mut WebSocket, event: &ChatEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json)).await
}
