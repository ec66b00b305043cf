//! HTTP surface of the Lendflow loan assistant: the `/ws/chat` and
//! `/chat/stream` transports, a non-streaming `/chat`, and the
//! `/chat/sessions` Session Directory.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use lendflow_agent::{LoanAgent, ProducerConfig, RemoteAgent, ScriptedAgent, StreamProducer};
use lendflow_persist::{MemorySessionStore, SessionStore};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AgentMode, Config, StoreBackend};
use crate::error::ApiError;
use crate::handlers::{chat, sse, ws};
use crate::routes::{health, sessions};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        chat::chat,
        sse::chat_stream,
        ws::chat_socket,
        sessions::list_sessions,
        sessions::create_session,
        sessions::get_session,
        sessions::update_title,
        sessions::delete_session,
        sessions::append_message,
        sessions::link_sessions,
    ),
    components(schemas(
        health::HealthResponse,
        chat::ChatResponse,
        sessions::UpdateTitleRequest,
        sessions::LinkSessionsRequest,
        sessions::LinkSessionsResponse,
        lendflow_types::ChatRequest,
        lendflow_types::SessionSummary,
        lendflow_types::SessionDetail,
        lendflow_types::StoredMessage,
        lendflow_types::NewSession,
        lendflow_types::NewMessage,
        lendflow_types::ToolCall,
        lendflow_types::ToolStatus,
        lendflow_types::Role,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "chat", description = "Turn streaming over SSE and WebSocket"),
        (name = "sessions", description = "Session Directory")
    )
)]
pub struct ApiDoc;

/// Build the agent selected by `agent.mode`
pub fn build_agent(config: &Config) -> Arc<dyn LoanAgent> {
    match config.agent.mode {
        AgentMode::Demo => Arc::new(
            ScriptedAgent::demo()
                .with_token_delay(Duration::from_millis(config.agent.token_delay_ms)),
        ),
        AgentMode::Remote => Arc::new(
            RemoteAgent::new(config.agent.endpoint.clone())
                .with_api_key(config.agent_api_key.clone())
                .with_timeout(Duration::from_secs(config.agent.timeout_secs)),
        ),
    }
}

pub fn build_producer(config: &Config, agent: Arc<dyn LoanAgent>) -> StreamProducer {
    StreamProducer::new(agent).with_config(
        ProducerConfig::new()
            .with_channel_capacity(config.agent.channel_capacity)
            .with_result_preview_chars(config.agent.result_preview_chars),
    )
}

/// Open the store selected by `store.backend`
pub async fn build_store(config: &Config) -> Result<Arc<dyn SessionStore>, ApiError> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemorySessionStore::new())),
        #[cfg(feature = "mongodb")]
        StoreBackend::Mongodb => {
            let uri = config
                .mongodb_uri
                .as_deref()
                .ok_or_else(|| ApiError::Config("MONGODB_URI is not set".to_string()))?;
            let store =
                lendflow_persist::MongoSessionStore::connect(uri, &config.store.database).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongodb"))]
        StoreBackend::Mongodb => Err(ApiError::Config(
            "store.backend = \"mongodb\" needs the mongodb feature".to_string(),
        )),
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Chat transports
        .route("/chat", post(chat::chat))
        .route("/chat/stream", get(sse::chat_stream))
        .route("/ws/chat", get(ws::chat_socket))
        // Session Directory
        .route(
            "/chat/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route("/chat/sessions/link", post(sessions::link_sessions))
        .route(
            "/chat/sessions/:session_id",
            get(sessions::get_session)
                .patch(sessions::update_title)
                .delete(sessions::delete_session),
        )
        .route(
            "/chat/sessions/:session_id/messages",
            post(sessions::append_message),
        );

    Router::new()
        .merge(api_routes)
        .merge(SwaggerUi::new("/api/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn(middleware::logging::log_request))
        .layer(TimeoutLayer::new(Duration::from_secs(300))) // 5 min for streaming
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors.enabled {
        let mut cors = CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any);

        if config.cors.origins.iter().any(|o| o == "*") {
            cors = cors.allow_origin(Any);
        } else {
            let origins: Vec<axum::http::HeaderValue> = config
                .cors
                .origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            cors = cors.allow_origin(origins);
        }

        cors
    } else {
        CorsLayer::permissive()
    }
}
