use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, Role, ToolCall};

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Session row as listed by the Session Directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
}

/// Session with its full message history (hydration source)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub messages: Vec<StoredMessage>,
}

/// A persisted, immutable message row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        Self {
            id: stored.id,
            role: stored.role,
            content: stored.content,
            timestamp: stored.created_at,
            is_streaming: false,
            tool_calls: stored.tool_calls.unwrap_or_default(),
            pdf_url: None,
            letter_id: None,
        }
    }
}

/// Body of `POST /chat/sessions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewSession {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Body of `POST /chat/sessions/{id}/messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl From<&Message> for NewMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: if message.tool_calls.is_empty() {
                None
            } else {
                Some(message.tool_calls.clone())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolStatus;

    #[test]
    fn test_detail_flattens_summary() {
        let now = Utc::now();
        let detail = SessionDetail {
            summary: SessionSummary {
                session_id: "s1".to_string(),
                customer_id: None,
                title: DEFAULT_SESSION_TITLE.to_string(),
                created_at: now,
                updated_at: now,
                message_count: 0,
                last_message_preview: None,
            },
            messages: vec![],
        };

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["session_id"], "s1");
        assert!(json["messages"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_new_message_from_sealed_message() {
        let mut message = Message::assistant_streaming(None);
        message.content = "Your EMI is 12000".to_string();
        message.is_streaming = false;
        message.tool_calls.push(ToolCall {
            tool: "calculate_emi".to_string(),
            agent: None,
            status: ToolStatus::Completed,
            result: Some("₹12,000".to_string()),
        });

        let new_message = NewMessage::from(&message);
        assert_eq!(new_message.role, Role::Assistant);
        assert_eq!(new_message.tool_calls.unwrap().len(), 1);
    }
}
