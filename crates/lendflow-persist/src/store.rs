use async_trait::async_trait;
use lendflow_types::{NewMessage, NewSession, SessionDetail, SessionSummary, StoredMessage};

use crate::error::Result;

/// Page size when the caller does not ask for one
pub const DEFAULT_LIST_LIMIT: usize = 50;

const TITLE_MAX_CHARS: usize = 50;
const PREVIEW_MAX_CHARS: usize = 100;

/// Result of an idempotent create
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSession {
    pub session: SessionSummary,
    /// false when the id already existed and was returned unchanged
    pub created: bool,
}

/// Trait for Session Directory operations
///
/// Implementations provide storage-specific CRUD for chat sessions and their
/// append-only message rows.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session; an existing id is returned unchanged
    async fn create_session(&self, new_session: NewSession) -> Result<CreatedSession>;

    /// Sessions ordered by `updated_at` desc, optionally for one customer
    async fn list_sessions(
        &self,
        customer_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SessionSummary>>;

    /// Sessions for a set of ids (anonymous users tracked client-side)
    async fn list_sessions_by_ids(&self, session_ids: &[String]) -> Result<Vec<SessionSummary>>;

    /// Session with messages in insertion order
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionDetail>>;

    /// Append one finalized message, creating the session if missing
    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<StoredMessage>;

    async fn update_title(&self, session_id: &str, title: &str) -> Result<()>;

    /// Remove messages then the session; returns whether it existed
    async fn delete_session(&self, session_id: &str) -> Result<bool>;

    /// Assign unowned sessions to a customer; returns how many were claimed
    async fn link_sessions_to_customer(
        &self,
        session_ids: &[String],
        customer_id: &str,
    ) -> Result<u64>;
}

/// Session title derived from message text
pub fn derive_title(content: &str) -> String {
    abbreviate(content, TITLE_MAX_CHARS)
}

/// `last_message_preview` derived from message text
pub fn derive_preview(content: &str) -> String {
    abbreviate(content, PREVIEW_MAX_CHARS)
}

fn abbreviate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_title_kept_verbatim() {
        assert_eq!(derive_title("I need a personal loan"), "I need a personal loan");
    }

    #[test]
    fn test_long_title_is_abbreviated() {
        let content = "a".repeat(60);
        let title = derive_title(&content);
        assert_eq!(title.len(), 53);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        let content = "₹".repeat(101);
        let preview = derive_preview(&content);
        assert_eq!(preview.chars().count(), 103);
    }
}
