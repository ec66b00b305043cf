use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Started,
    Completed,
}

/// Tool invocation shown under an assistant message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ToolCall {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCall {
    pub fn started(tool: impl Into<String>, agent: Option<String>) -> Self {
        Self {
            tool: tool.into(),
            agent,
            status: ToolStatus::Started,
            result: None,
        }
    }

    pub fn is_unresolved_for(&self, tool: &str, agent: Option<&str>) -> bool {
        self.status == ToolStatus::Started && self.tool == tool && self.agent.as_deref() == agent
    }

    pub fn complete(&mut self, result: Option<String>) {
        self.status = ToolStatus::Completed;
        self.result = result;
    }
}

/// A chat message as the conversation view holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_streaming: bool,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            is_streaming: false,
            tool_calls: Vec::new(),
            pdf_url: None,
            letter_id: None,
        }
    }

    /// Empty streaming assistant message opened by `content_start`
    pub fn assistant_streaming(id: Option<String>) -> Self {
        Self {
            id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            role: Role::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            is_streaming: true,
            tool_calls: Vec::new(),
            pdf_url: None,
            letter_id: None,
        }
    }

    pub fn is_open_assistant(&self) -> bool {
        self.role == Role::Assistant && self.is_streaming
    }
}

/// Entry in the session-wide audit timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDecision {
    pub id: String,
    pub agent: String,
    pub decision_type: String,
    pub summary: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl AgentDecision {
    pub fn new(
        agent: impl Into<String>,
        decision_type: impl Into<String>,
        summary: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent: agent.into(),
            decision_type: decision_type.into(),
            summary: summary.into(),
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}
