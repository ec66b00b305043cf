use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, Stream, StreamExt};
use lendflow_types::{ChatEvent, StreamQuery};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{handlers::turn_input, state::AppState};

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Stream one turn as Server-Sent Events
///
/// Every frame is `data: <json event>\n\n`. An empty message yields a single
/// `error` frame and the stream ends.
#[utoipa::path(
    get,
    path = "/chat/stream",
    params(
        ("message" = String, Query, description = "User message text"),
        ("session_id" = Option<String>, Query, description = "Session id (default: default_session)"),
        ("customer_id" = Option<String>, Query, description = "Verified customer id"),
        ("customer_name" = Option<String>, Query, description = "Customer display name")
    ),
    responses(
        (status = 200, description = "Streaming response", content_type = "text/event-stream")
    ),
    tag = "chat"
)]
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let events: EventStream = match turn_input(
        &query.session_id,
        &query.message,
        query.customer_id,
        query.customer_name,
    ) {
        Ok(input) => {
            tracing::info!(session_id = %input.session_id, "SSE turn started");
            let receiver = state.producer.spawn_turn(input);
            Box::pin(ReceiverStream::new(receiver).map(|event| Ok(to_sse_event(&event))))
        }
        Err(error) => Box::pin(stream::once(async move { Ok(to_sse_event(&error)) })),
    };

    (
        [("x-accel-buffering", "no"), ("cache-control", "no-cache")],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}

fn to_sse_event(event: &ChatEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            tracing::error!("Failed to encode {} event: {}", event.kind(), e);
            Event::default().data(r#"{"type":"error","message":"Failed to encode event"}"#)
        }
    }
}
