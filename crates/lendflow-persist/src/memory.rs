use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use lendflow_types::{
    NewMessage, NewSession, Role, SessionDetail, SessionSummary, StoredMessage,
    DEFAULT_SESSION_TITLE,
};
use tokio::sync::RwLock;

use crate::error::{PersistError, Result};
use crate::store::{derive_preview, derive_title, CreatedSession, SessionStore, DEFAULT_LIST_LIMIT};

struct SessionRecord {
    summary: SessionSummary,
    messages: Vec<StoredMessage>,
    /// Tie-breaker for equal `updated_at` values
    touched: u64,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn sorted<'a>(records: impl Iterator<Item = &'a SessionRecord>) -> Vec<SessionSummary> {
        let mut records: Vec<&SessionRecord> = records.collect();
        records.sort_by(|a, b| {
            b.summary
                .updated_at
                .cmp(&a.summary.updated_at)
                .then(b.touched.cmp(&a.touched))
        });
        records.into_iter().map(|r| r.summary.clone()).collect()
    }
}

/// Process-local Session Directory
///
/// Default backend for the demo server and the store used in tests.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn empty_summary(session_id: &str, customer_id: Option<String>, title: String) -> SessionSummary {
    let now = Utc::now();
    SessionSummary {
        session_id: session_id.to_string(),
        customer_id,
        title,
        created_at: now,
        updated_at: now,
        message_count: 0,
        last_message_preview: None,
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, new_session: NewSession) -> Result<CreatedSession> {
        if new_session.session_id.trim().is_empty() {
            return Err(PersistError::InvalidInput("session_id is required".to_string()));
        }

        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.sessions.get(&new_session.session_id) {
            return Ok(CreatedSession {
                session: existing.summary.clone(),
                created: false,
            });
        }

        let title = new_session
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
        let summary = empty_summary(&new_session.session_id, new_session.customer_id, title);
        let touched = inner.tick();
        inner.sessions.insert(
            new_session.session_id.clone(),
            SessionRecord {
                summary: summary.clone(),
                messages: Vec::new(),
                touched,
            },
        );

        tracing::debug!(session_id = %new_session.session_id, "Created session");
        Ok(CreatedSession {
            session: summary,
            created: true,
        })
    }

    async fn list_sessions(
        &self,
        customer_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SessionSummary>> {
        let inner = self.inner.read().await;
        let records = inner.sessions.values().filter(|r| match customer_id {
            Some(id) => r.summary.customer_id.as_deref() == Some(id),
            None => true,
        });

        let mut sessions = Inner::sorted(records);
        sessions.truncate(limit.unwrap_or(DEFAULT_LIST_LIMIT));
        Ok(sessions)
    }

    async fn list_sessions_by_ids(&self, session_ids: &[String]) -> Result<Vec<SessionSummary>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.read().await;
        let records = inner
            .sessions
            .values()
            .filter(|r| session_ids.contains(&r.summary.session_id));
        Ok(Inner::sorted(records))
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionDetail>> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(session_id).map(|r| SessionDetail {
            summary: r.summary.clone(),
            messages: r.messages.clone(),
        }))
    }

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<StoredMessage> {
        let mut inner = self.inner.write().await;
        let touched = inner.tick();

        let record = inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord {
                summary: empty_summary(session_id, None, derive_title(&message.content)),
                messages: Vec::new(),
                touched,
            });

        let stored = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: message.role,
            content: message.content,
            tool_calls: message.tool_calls.filter(|calls| !calls.is_empty()),
            created_at: Utc::now(),
        };
        record.messages.push(stored.clone());

        let summary = &mut record.summary;
        summary.message_count += 1;
        summary.last_message_preview = Some(derive_preview(&stored.content));
        summary.updated_at = stored.created_at;
        if stored.role == Role::User && summary.title == DEFAULT_SESSION_TITLE {
            summary.title = derive_title(&stored.content);
        }
        record.touched = touched;

        Ok(stored)
    }

    async fn update_title(&self, session_id: &str, title: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let touched = inner.tick();
        let record = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PersistError::SessionNotFound(session_id.to_string()))?;

        record.summary.title = title.to_string();
        record.summary.updated_at = Utc::now();
        record.touched = touched;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.sessions.remove(session_id).is_some())
    }

    async fn link_sessions_to_customer(
        &self,
        session_ids: &[String],
        customer_id: &str,
    ) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut claimed = 0;

        for session_id in session_ids {
            let touched = inner.tick();
            if let Some(record) = inner.sessions.get_mut(session_id) {
                if record.summary.customer_id.is_none() {
                    record.summary.customer_id = Some(customer_id.to_string());
                    record.summary.updated_at = now;
                    record.touched = touched;
                    claimed += 1;
                }
            }
        }

        tracing::info!(customer_id, claimed, "Linked anonymous sessions to customer");
        Ok(claimed)
    }
}
