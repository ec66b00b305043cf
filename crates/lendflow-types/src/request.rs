use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_ID: &str = "default_session";

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

/// Inbound frame on `/ws/chat`, also the body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            customer_id: None,
            customer_name: None,
        }
    }
}

/// Query string of `GET /chat/stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamQuery {
    pub message: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
}

impl StreamQuery {
    pub fn from_request(session_id: impl Into<String>, request: &ChatRequest) -> Self {
        Self {
            message: request.message.clone(),
            session_id: session_id.into(),
            customer_id: request.customer_id.clone(),
            customer_name: request.customer_name.clone(),
        }
    }
}
