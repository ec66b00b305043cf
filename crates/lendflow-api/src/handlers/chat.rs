use axum::{extract::State, Json};
use lendflow_types::{ChatEvent, ChatRequest, DEFAULT_SESSION_ID};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, ApiResult},
    handlers::turn_input,
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter_id: Option<String>,
}

/// Run one turn and return the full reply (non-streaming)
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Empty message"),
        (status = 500, description = "Agent failure")
    ),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let session_id = req
        .session_id
        .clone()
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

    let input = turn_input(&session_id, &req.message, req.customer_id, req.customer_name)
        .map_err(|_| ApiError::BadRequest(super::MESSAGE_REQUIRED.to_string()))?;

    let mut events = state.producer.spawn_turn(input);
    let mut reply = ChatResponse {
        response: String::new(),
        session_id,
        pdf_url: None,
        letter_id: None,
    };

    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::Content { data, .. } => reply.response.push_str(&data),
            ChatEvent::SanctionLetter {
                pdf_url, letter_id, ..
            } => {
                reply.pdf_url = Some(pdf_url);
                reply.letter_id = Some(letter_id);
            }
            ChatEvent::Error { message } => return Err(ApiError::Agent(message)),
            ChatEvent::Done { .. } => break,
            _ => {}
        }
    }

    Ok(Json(reply))
}
