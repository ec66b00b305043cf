use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub services: HashMap<String, String>,
}

/// Health check endpoint
///
/// Returns the health status of the API and its dependencies
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut services = HashMap::new();

    // Listing one session is the cheapest round trip the store offers
    let store_status = match state.store.list_sessions(None, Some(1)).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!("Session store health check failed: {}", e);
            "disconnected"
        }
    };
    services.insert("session_store".to_string(), store_status.to_string());
    services.insert("agent".to_string(), state.producer.agent_name().to_string());
    services.insert(
        "websocket_connections".to_string(),
        state.connections.count().to_string(),
    );

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "loan-sales-assistant".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
    })
}
