use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use lendflow_persist::DEFAULT_LIST_LIMIT;
use lendflow_types::{NewMessage, NewSession, SessionDetail, SessionSummary, StoredMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub customer_id: Option<String>,
    /// Comma-separated session ids (anonymous users)
    pub ids: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTitleRequest {
    pub title: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkSessionsRequest {
    pub session_ids: Vec<String>,
    pub customer_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkSessionsResponse {
    pub linked: u64,
}

/// List sessions, newest activity first
#[utoipa::path(
    get,
    path = "/chat/sessions",
    params(
        ("customer_id" = Option<String>, Query, description = "Only this customer's sessions"),
        ("ids" = Option<String>, Query, description = "Comma-separated session ids; takes precedence over customer_id"),
        ("limit" = Option<usize>, Query, description = "Maximum sessions to return (default: 50, max: 100)")
    ),
    responses(
        (status = 200, description = "Session summaries", body = [SessionSummary])
    ),
    tag = "sessions"
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    if let Some(ids) = query.ids {
        let ids: Vec<String> = ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        return Ok(Json(state.store.list_sessions_by_ids(&ids).await?));
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let customer_id = query.customer_id.as_deref().filter(|id| !id.is_empty());
    let sessions = state.store.list_sessions(customer_id, Some(limit)).await?;
    Ok(Json(sessions))
}

/// Create a session; an existing id is returned unchanged with 200
#[utoipa::path(
    post,
    path = "/chat/sessions",
    request_body = NewSession,
    responses(
        (status = 201, description = "Session created", body = SessionSummary),
        (status = 200, description = "Session already existed", body = SessionSummary),
        (status = 400, description = "Invalid request")
    ),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSession>,
) -> ApiResult<(StatusCode, Json<SessionSummary>)> {
    if req.session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("session_id is required".to_string()));
    }

    let created = state.store.create_session(req).await?;
    let status = if created.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(created.session)))
}

/// Session with its full message history
#[utoipa::path(
    get,
    path = "/chat/sessions/{session_id}",
    params(
        ("session_id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Session details", body = SessionDetail),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionDetail>> {
    let detail = state
        .store
        .get_session(&session_id)
        .await?
        .ok_or(ApiError::SessionNotFound(session_id))?;

    Ok(Json(detail))
}

/// Rename a session
#[utoipa::path(
    patch,
    path = "/chat/sessions/{session_id}",
    params(
        ("session_id" = String, Path, description = "Session id")
    ),
    request_body = UpdateTitleRequest,
    responses(
        (status = 204, description = "Title updated"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn update_title(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<UpdateTitleRequest>,
) -> ApiResult<StatusCode> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    state.store.update_title(&session_id, title).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a session and its messages
#[utoipa::path(
    delete,
    path = "/chat/sessions/{session_id}",
    params(
        ("session_id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.store.delete_session(&session_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(session_id))
    }
}

/// Persist one finalized message
#[utoipa::path(
    post,
    path = "/chat/sessions/{session_id}/messages",
    params(
        ("session_id" = String, Path, description = "Session id; created if missing")
    ),
    request_body = NewMessage,
    responses(
        (status = 201, description = "Message stored", body = StoredMessage),
        (status = 400, description = "Invalid request")
    ),
    tag = "sessions"
)]
pub async fn append_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(message): Json<NewMessage>,
) -> ApiResult<(StatusCode, Json<StoredMessage>)> {
    let stored = state.store.append_message(&session_id, message).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Claim anonymous sessions for a verified customer
#[utoipa::path(
    post,
    path = "/chat/sessions/link",
    request_body = LinkSessionsRequest,
    responses(
        (status = 200, description = "Number of sessions claimed", body = LinkSessionsResponse)
    ),
    tag = "sessions"
)]
pub async fn link_sessions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LinkSessionsRequest>,
) -> ApiResult<Json<LinkSessionsResponse>> {
    if req.customer_id.trim().is_empty() {
        return Err(ApiError::BadRequest("customer_id is required".to_string()));
    }

    let linked = state
        .store
        .link_sessions_to_customer(&req.session_ids, &req.customer_id)
        .await?;
    Ok(Json(LinkSessionsResponse { linked }))
}
