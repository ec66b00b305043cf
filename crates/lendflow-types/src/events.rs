use serde::{Deserialize, Serialize};

/// One protocol frame sent from the server to a chat client.
///
/// The same vocabulary travels over both transports: as a text frame on
/// `/ws/chat` and as a `data: <json>` line on `/chat/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Request received, processing started
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A new assistant message begins
    ContentStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Text fragment appended to the open assistant message
    Content {
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// A named tool invocation began
    #[serde(alias = "member_tool_start")]
    ToolStart {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// The oldest unresolved matching tool invocation finished
    #[serde(alias = "member_tool_complete")]
    ToolComplete {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Domain checkpoint derived from a tool result (audit timeline)
    AgentDecision {
        agent: String,
        decision_type: String,
        summary: String,
        details: String,
    },

    /// Generated sanction letter for the current assistant message
    SanctionLetter {
        pdf_url: String,
        letter_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Assistant message complete
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Unrecoverable failure for this turn; no `done` follows
    Error {
        message: String,
    },

    /// Any `type` this build does not know about
    #[serde(other)]
    Unknown,
}

impl ChatEvent {
    pub fn ack() -> Self {
        ChatEvent::Ack {
            message: Some("Processing...".to_string()),
        }
    }

    pub fn content(data: impl Into<String>) -> Self {
        ChatEvent::Content {
            data: data.into(),
            message_id: None,
        }
    }

    pub fn tool_start(tool: impl Into<String>, agent: Option<String>) -> Self {
        ChatEvent::ToolStart {
            tool: tool.into(),
            agent,
            message_id: None,
        }
    }

    pub fn tool_complete(
        tool: impl Into<String>,
        agent: Option<String>,
        result: Option<String>,
    ) -> Self {
        ChatEvent::ToolComplete {
            tool: tool.into(),
            agent,
            result,
            message_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ChatEvent::Error {
            message: message.into(),
        }
    }

    /// Name of the wire discriminator, mostly for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::Ack { .. } => "ack",
            ChatEvent::ContentStart { .. } => "content_start",
            ChatEvent::Content { .. } => "content",
            ChatEvent::ToolStart { .. } => "tool_start",
            ChatEvent::ToolComplete { .. } => "tool_complete",
            ChatEvent::AgentDecision { .. } => "agent_decision",
            ChatEvent::SanctionLetter { .. } => "sanction_letter",
            ChatEvent::Done { .. } => "done",
            ChatEvent::Error { .. } => "error",
            ChatEvent::Unknown => "unknown",
        }
    }

    /// `done` and `error` end a turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done { .. } | ChatEvent::Error { .. })
    }

    /// Message id this event targets, when the producer stamped one
    pub fn message_id(&self) -> Option<&str> {
        match self {
            ChatEvent::ContentStart { message_id }
            | ChatEvent::Content { message_id, .. }
            | ChatEvent::ToolStart { message_id, .. }
            | ChatEvent::ToolComplete { message_id, .. }
            | ChatEvent::SanctionLetter { message_id, .. }
            | ChatEvent::Done { message_id } => message_id.as_deref(),
            _ => None,
        }
    }

    /// Stamp the turn's message id onto events that address a message
    pub fn with_message_id(mut self, id: &str) -> Self {
        match &mut self {
            ChatEvent::ContentStart { message_id }
            | ChatEvent::Content { message_id, .. }
            | ChatEvent::ToolStart { message_id, .. }
            | ChatEvent::ToolComplete { message_id, .. }
            | ChatEvent::SanctionLetter { message_id, .. }
            | ChatEvent::Done { message_id } => *message_id = Some(id.to_string()),
            _ => {}
        }
        self
    }

    /// Render as one Server-Sent Events frame
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_serialization() {
        let json = serde_json::to_string(&ChatEvent::content("Hi")).unwrap();
        assert_eq!(json, r#"{"type":"content","data":"Hi"}"#);
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let event: ChatEvent = serde_json::from_str(r#"{"type":"typing","who":"bot"}"#).unwrap();
        assert_eq!(event, ChatEvent::Unknown);
    }

    #[test]
    fn test_member_tool_aliases() {
        let event: ChatEvent =
            serde_json::from_str(r#"{"type":"member_tool_start","agent":"underwriting","tool":"fetch_credit_score"}"#)
                .unwrap();

        match event {
            ChatEvent::ToolStart { tool, agent, .. } => {
                assert_eq!(tool, "fetch_credit_score");
                assert_eq!(agent.as_deref(), Some("underwriting"));
            }
            _ => panic!("Expected ToolStart variant"),
        }
    }

    #[test]
    fn test_tool_complete_without_optional_fields() {
        let event: ChatEvent = serde_json::from_str(r#"{"type":"tool_complete","tool":"x"}"#).unwrap();
        assert_eq!(event, ChatEvent::tool_complete("x", None, None));
    }

    #[test]
    fn test_with_message_id_skips_unaddressed_events() {
        let stamped = ChatEvent::content("a").with_message_id("m1");
        assert_eq!(stamped.message_id(), Some("m1"));

        let error = ChatEvent::error("boom").with_message_id("m1");
        assert_eq!(error.message_id(), None);
    }

    #[test]
    fn test_sse_frame_format() {
        let frame = ChatEvent::Done { message_id: None }.to_sse_frame().unwrap();
        assert_eq!(frame, "data: {\"type\":\"done\"}\n\n");
    }

    #[test]
    fn test_terminal_events() {
        assert!(ChatEvent::Done { message_id: None }.is_terminal());
        assert!(ChatEvent::error("x").is_terminal());
        assert!(!ChatEvent::ack().is_terminal());
    }
}
