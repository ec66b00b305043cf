//! Conversation state driven by protocol events.
//!
//! The reducer owns the message log of one session and never performs I/O:
//! every mutation that needs to reach the Session Directory is returned as an
//! [`Effect`] for the caller to run.

use lendflow_types::{AgentDecision, ChatEvent, Message, NewMessage, Role, SessionDetail};
use thiserror::Error;

/// Side effect requested by a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Save a finalized message to the Session Directory
    Persist(NewMessage),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReducerError {
    #[error("A turn is already in flight")]
    TurnInFlight,

    #[error("Message is empty")]
    EmptyMessage,
}

/// Prefix for every user-visible failure
pub const ERROR_PREFIX: &str = "Error:";

pub fn error_display(message: &str) -> String {
    format!("{} {}", ERROR_PREFIX, message)
}

#[derive(Debug, Clone)]
pub struct ConversationReducer {
    session_id: String,
    messages: Vec<Message>,
    decisions: Vec<AgentDecision>,
    is_loading: bool,
}

impl ConversationReducer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            decisions: Vec::new(),
            is_loading: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Session-wide audit timeline
    pub fn decisions(&self) -> &[AgentDecision] {
        &self.decisions
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The assistant message currently streaming, if any
    pub fn open_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_open_assistant())
    }

    /// Start over on a different session
    pub fn reset(&mut self, session_id: impl Into<String>) {
        *self = Self::new(session_id);
    }

    /// Replace the log with a stored session's history
    pub fn hydrate(&mut self, detail: SessionDetail) {
        tracing::debug!(
            session_id = %detail.summary.session_id,
            messages = detail.messages.len(),
            "Hydrating conversation"
        );
        self.session_id = detail.summary.session_id;
        self.messages = detail.messages.into_iter().map(Message::from).collect();
        self.decisions.clear();
        self.is_loading = false;
    }

    /// Append the user's message and open a turn
    pub fn submit_user(&mut self, text: &str) -> Result<Vec<Effect>, ReducerError> {
        if self.is_loading {
            return Err(ReducerError::TurnInFlight);
        }
        if text.trim().is_empty() {
            return Err(ReducerError::EmptyMessage);
        }

        let message = Message::user(text);
        let effect = Effect::Persist(NewMessage::from(&message));
        self.messages.push(message);
        self.is_loading = true;
        Ok(vec![effect])
    }

    /// Fold one protocol event into the conversation
    pub fn apply(&mut self, event: ChatEvent) -> Vec<Effect> {
        match event {
            ChatEvent::Ack { .. } | ChatEvent::Unknown => Vec::new(),

            ChatEvent::ContentStart { message_id } => {
                if self.open_index(None).is_some() {
                    tracing::debug!("content_start while a message is open; ignored");
                } else {
                    self.messages.push(Message::assistant_streaming(message_id));
                }
                Vec::new()
            }

            ChatEvent::Content { data, message_id } => {
                match self.open_index(message_id.as_deref()) {
                    Some(idx) => self.messages[idx].content.push_str(&data),
                    None => tracing::debug!("content with no open message; ignored"),
                }
                Vec::new()
            }

            ChatEvent::ToolStart { tool, agent, message_id } => {
                if let Some(idx) = self.open_index(message_id.as_deref()) {
                    let calls = &mut self.messages[idx].tool_calls;
                    if calls.iter().any(|c| c.is_unresolved_for(&tool, agent.as_deref())) {
                        tracing::debug!(tool = %tool, "Duplicate tool_start; ignored");
                    } else {
                        calls.push(lendflow_types::ToolCall::started(tool, agent));
                    }
                }
                Vec::new()
            }

            ChatEvent::ToolComplete { tool, agent, result, message_id } => {
                if let Some(idx) = self.open_index(message_id.as_deref()) {
                    let pending = self.messages[idx]
                        .tool_calls
                        .iter_mut()
                        .find(|c| c.is_unresolved_for(&tool, agent.as_deref()));
                    match pending {
                        Some(call) => call.complete(result),
                        None => tracing::debug!(tool = %tool, "Unmatched tool_complete; ignored"),
                    }
                }
                Vec::new()
            }

            ChatEvent::AgentDecision { agent, decision_type, summary, details } => {
                self.decisions
                    .push(AgentDecision::new(agent, decision_type, summary, details));
                Vec::new()
            }

            ChatEvent::SanctionLetter { pdf_url, letter_id, message_id } => {
                let target = message_id
                    .as_deref()
                    .and_then(|id| self.messages.iter().rposition(|m| m.id == id))
                    .or_else(|| self.messages.iter().rposition(|m| m.role == Role::Assistant));
                match target {
                    Some(idx) => {
                        let message = &mut self.messages[idx];
                        message.pdf_url = Some(pdf_url);
                        message.letter_id = Some(letter_id);
                    }
                    None => tracing::debug!("sanction_letter with no assistant message; ignored"),
                }
                Vec::new()
            }

            ChatEvent::Done { message_id } => {
                self.is_loading = false;
                match self.open_index(message_id.as_deref()) {
                    Some(idx) => {
                        let message = &mut self.messages[idx];
                        message.is_streaming = false;
                        vec![Effect::Persist(NewMessage::from(&*message))]
                    }
                    None => Vec::new(),
                }
            }

            ChatEvent::Error { message } => {
                self.fail_turn(&message);
                Vec::new()
            }
        }
    }

    /// The transport gave up mid-turn
    pub fn transport_failed(&mut self, reason: &str) {
        tracing::warn!(session_id = %self.session_id, "Transport failed: {}", reason);
        self.fail_turn(reason);
    }

    /// Drop the in-flight turn without persisting anything
    pub fn abort_turn(&mut self) {
        if let Some(idx) = self.open_index(None) {
            self.messages[idx].is_streaming = false;
        }
        self.is_loading = false;
    }

    fn fail_turn(&mut self, reason: &str) {
        let display = error_display(reason);
        match self.open_index(None) {
            Some(idx) => {
                let message = &mut self.messages[idx];
                message.content = display;
                message.is_streaming = false;
            }
            None => {
                let mut message = Message::assistant_streaming(None);
                message.content = display;
                message.is_streaming = false;
                self.messages.push(message);
            }
        }
        self.is_loading = false;
    }

    /// Explicit id when the event carries one, otherwise the last message
    fn open_index(&self, message_id: Option<&str>) -> Option<usize> {
        match message_id {
            Some(id) => self
                .messages
                .iter()
                .rposition(|m| m.id == id && m.is_open_assistant()),
            None => {
                let idx = self.messages.len().checked_sub(1)?;
                self.messages[idx].is_open_assistant().then_some(idx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendflow_types::ToolStatus;

    fn reducer() -> ConversationReducer {
        let mut r = ConversationReducer::new("s1");
        r.submit_user("hello").unwrap();
        r
    }

    fn apply_all(r: &mut ConversationReducer, events: Vec<ChatEvent>) -> Vec<Effect> {
        events.into_iter().flat_map(|e| r.apply(e)).collect()
    }

    fn start() -> ChatEvent {
        ChatEvent::ContentStart { message_id: None }
    }

    fn done() -> ChatEvent {
        ChatEvent::Done { message_id: None }
    }

    #[test]
    fn test_simple_turn() {
        let mut r = reducer();
        let effects = apply_all(
            &mut r,
            vec![
                ChatEvent::ack(),
                start(),
                ChatEvent::content("H"),
                ChatEvent::content("i"),
                done(),
            ],
        );

        let last = r.last_message().unwrap();
        assert_eq!(last.content, "Hi");
        assert!(!last.is_streaming);
        assert!(!r.is_loading());
        assert_eq!(
            effects,
            vec![Effect::Persist(NewMessage {
                role: Role::Assistant,
                content: "Hi".to_string(),
                tool_calls: None,
            })]
        );
    }

    #[test]
    fn test_tool_call_completes() {
        let mut r = reducer();
        apply_all(
            &mut r,
            vec![
                start(),
                ChatEvent::tool_start("calculate_emi", None),
                ChatEvent::tool_complete("calculate_emi", None, Some("₹12,000".to_string())),
                ChatEvent::content("Your EMI is 12000"),
                done(),
            ],
        );

        let last = r.last_message().unwrap();
        assert_eq!(last.content, "Your EMI is 12000");
        assert_eq!(last.tool_calls.len(), 1);
        assert_eq!(last.tool_calls[0].status, ToolStatus::Completed);
        assert_eq!(last.tool_calls[0].result.as_deref(), Some("₹12,000"));
    }

    #[test]
    fn test_error_replaces_partial_content() {
        let mut r = reducer();
        let effects = apply_all(
            &mut r,
            vec![start(), ChatEvent::content("Partial"), ChatEvent::error("upstream timeout")],
        );

        let last = r.last_message().unwrap();
        assert_eq!(last.content, "Error: upstream timeout");
        assert!(!last.is_streaming);
        assert!(last.pdf_url.is_none());
        assert!(effects.is_empty());
        assert!(!r.is_loading());
    }

    #[test]
    fn test_error_before_content_start_appends_message() {
        let mut r = reducer();
        r.apply(ChatEvent::error("Message is required"));

        assert_eq!(r.messages().len(), 2);
        assert_eq!(r.last_message().unwrap().role, Role::Assistant);
        assert_eq!(r.last_message().unwrap().content, "Error: Message is required");
    }

    #[test]
    fn test_unmatched_tool_complete_is_noop() {
        let mut r = reducer();
        r.apply(start());
        r.apply(ChatEvent::tool_complete("x", None, None));
        assert!(r.last_message().unwrap().tool_calls.is_empty());
    }

    #[test]
    fn test_sanction_after_done_still_attaches() {
        let mut r = reducer();
        apply_all(&mut r, vec![start(), ChatEvent::content("Ready"), done()]);
        r.apply(ChatEvent::SanctionLetter {
            pdf_url: "u".to_string(),
            letter_id: "L1".to_string(),
            message_id: None,
        });

        let last = r.last_message().unwrap();
        assert_eq!(last.pdf_url.as_deref(), Some("u"));
        assert_eq!(last.letter_id.as_deref(), Some("L1"));
    }

    #[test]
    fn test_done_replay_is_idempotent() {
        let mut r = reducer();
        apply_all(&mut r, vec![start(), ChatEvent::content("Hi"), done()]);
        let before = r.messages().to_vec();

        assert!(r.apply(done()).is_empty());
        assert_eq!(r.messages(), &before[..]);
    }

    #[test]
    fn test_content_after_done_is_ignored() {
        let mut r = reducer();
        apply_all(
            &mut r,
            vec![
                start(),
                ChatEvent::content("Hi"),
                done(),
                ChatEvent::content(" there"),
                ChatEvent::tool_start("calculate_emi", None),
            ],
        );
        let last = r.last_message().unwrap();
        assert_eq!(last.content, "Hi");
        assert!(last.tool_calls.is_empty());
    }

    #[test]
    fn test_nested_content_start_is_ignored() {
        let mut r = reducer();
        apply_all(&mut r, vec![start(), ChatEvent::content("A"), start(), ChatEvent::content("B")]);
        assert_eq!(r.messages().len(), 2);
        assert_eq!(r.last_message().unwrap().content, "AB");
    }

    #[test]
    fn test_duplicate_tool_start_keeps_single_pending_entry() {
        let mut r = reducer();
        apply_all(
            &mut r,
            vec![
                start(),
                ChatEvent::tool_start("fetch_credit_score", Some("underwriting".into())),
                ChatEvent::tool_start("fetch_credit_score", Some("underwriting".into())),
                ChatEvent::tool_start("fetch_credit_score", None),
            ],
        );
        let calls = &r.last_message().unwrap().tool_calls;
        assert_eq!(calls.len(), 2);

        r.apply(ChatEvent::tool_complete("fetch_credit_score", Some("underwriting".into()), None));
        r.apply(ChatEvent::tool_start("fetch_credit_score", Some("underwriting".into())));
        let calls = &r.last_message().unwrap().tool_calls;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].status, ToolStatus::Completed);
        assert_eq!(calls[1].status, ToolStatus::Started);
        assert_eq!(calls[2].status, ToolStatus::Started);
    }

    #[test]
    fn test_message_id_targets_explicitly() {
        let mut r = reducer();
        r.apply(ChatEvent::ContentStart { message_id: Some("m1".into()) });
        r.apply(ChatEvent::content("ok").with_message_id("m1"));
        r.apply(ChatEvent::content("lost").with_message_id("other"));

        assert_eq!(r.last_message().unwrap().id, "m1");
        assert_eq!(r.last_message().unwrap().content, "ok");
    }

    #[test]
    fn test_submit_gated_while_loading() {
        let mut r = reducer();
        assert_eq!(r.submit_user("again"), Err(ReducerError::TurnInFlight));

        apply_all(&mut r, vec![start(), done()]);
        assert!(r.submit_user("again").is_ok());
        assert_eq!(r.submit_user("   "), Err(ReducerError::TurnInFlight));
    }

    #[test]
    fn test_empty_submission_rejected() {
        let mut r = ConversationReducer::new("s1");
        assert_eq!(r.submit_user("  "), Err(ReducerError::EmptyMessage));
        assert!(r.messages().is_empty());
    }

    #[test]
    fn test_decisions_do_not_touch_messages() {
        let mut r = reducer();
        r.apply(ChatEvent::AgentDecision {
            agent: "Underwriting Agent".into(),
            decision_type: "loan_approved".into(),
            summary: "Loan approved for ₹300000".into(),
            details: "{}".into(),
        });
        assert_eq!(r.messages().len(), 1);
        assert_eq!(r.decisions().len(), 1);
        assert_eq!(r.decisions()[0].decision_type, "loan_approved");
    }

    #[test]
    fn test_abort_seals_without_persisting() {
        let mut r = reducer();
        let effects = apply_all(&mut r, vec![start(), ChatEvent::content("Part")]);
        r.abort_turn();

        assert!(effects.is_empty());
        assert!(!r.is_loading());
        let last = r.last_message().unwrap();
        assert!(!last.is_streaming);
        assert_eq!(last.content, "Part");
        assert!(r.apply(done()).is_empty());
    }

    #[test]
    fn test_transport_failure_renders_single_error() {
        let mut r = reducer();
        r.transport_failed("connection refused");
        assert_eq!(r.messages().len(), 2);
        assert!(r.last_message().unwrap().content.starts_with(ERROR_PREFIX));
        assert!(!r.is_loading());
    }

    #[test]
    fn test_concatenation_preserves_order() {
        let chunks = ["₹", "3,00", ",000 ", "", "approved", " ✓", "\n", "EMI"];
        let mut r = reducer();
        r.apply(start());
        for chunk in chunks {
            r.apply(ChatEvent::content(chunk));
        }
        r.apply(done());
        assert_eq!(r.last_message().unwrap().content, chunks.concat());
    }
}
