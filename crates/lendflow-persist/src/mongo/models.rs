use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use lendflow_types::{Role, SessionSummary, StoredMessage, ToolCall};
use serde::{Deserialize, Serialize};

/// Session document; the client-chosen session id is the primary key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSession {
    #[serde(rename = "_id")]
    pub session_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub title: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<MongoSession> for SessionSummary {
    fn from(session: MongoSession) -> Self {
        Self {
            session_id: session.session_id,
            customer_id: session.customer_id,
            title: session.title,
            created_at: session.created_at,
            updated_at: session.updated_at,
            message_count: session.message_count.max(0) as u64,
            last_message_preview: session.last_message_preview,
        }
    }
}

impl From<MongoMessage> for StoredMessage {
    fn from(message: MongoMessage) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            tool_calls: message.tool_calls,
            created_at: message.created_at,
        }
    }
}
