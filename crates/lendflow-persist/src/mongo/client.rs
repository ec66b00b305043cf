use async_trait::async_trait;
use chrono::Utc;
use lendflow_types::{
    NewMessage, NewSession, Role, SessionDetail, SessionSummary, StoredMessage,
    DEFAULT_SESSION_TITLE,
};
use mongodb::Client;

use crate::error::{PersistError, Result};
use crate::mongo::models::{MongoMessage, MongoSession};
use crate::mongo::repositories::{MongoMessageRepository, MongoSessionRepository};
use crate::store::{derive_preview, derive_title, CreatedSession, SessionStore, DEFAULT_LIST_LIMIT};

/// Session Directory backed by the `chat_sessions` / `chat_messages`
/// collections
pub struct MongoSessionStore {
    session_repo: MongoSessionRepository,
    message_repo: MongoMessageRepository,
}

impl MongoSessionStore {
    /// Connect to MongoDB and create client
    pub async fn connect(mongodb_uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        tracing::info!(database, "Connected to MongoDB session store");

        Ok(Self {
            session_repo: MongoSessionRepository::new(&client, database),
            message_repo: MongoMessageRepository::new(&client, database),
        })
    }

    async fn require(&self, session_id: &str) -> Result<MongoSession> {
        self.session_repo
            .get(session_id)
            .await?
            .ok_or_else(|| PersistError::SessionNotFound(session_id.to_string()))
    }
}

fn new_document(session_id: &str, customer_id: Option<String>, title: String) -> MongoSession {
    let now = Utc::now();
    MongoSession {
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
impl SessionStore for MongoSessionStore {
    async fn create_session(&self, new_session: NewSession) -> Result<CreatedSession> {
        if new_session.session_id.trim().is_empty() {
            return Err(PersistError::InvalidInput("session_id is required".to_string()));
        }

        let title = new_session
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
        let document = new_document(&new_session.session_id, new_session.customer_id, title);

        let created = self.session_repo.insert_if_absent(&document).await?;
        let session = self.require(&new_session.session_id).await?;

        Ok(CreatedSession {
            session: session.into(),
            created,
        })
    }

    async fn list_sessions(
        &self,
        customer_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SessionSummary>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT) as i64;
        let sessions = self.session_repo.list(customer_id, limit).await?;
        Ok(sessions.into_iter().map(Into::into).collect())
    }

    async fn list_sessions_by_ids(&self, session_ids: &[String]) -> Result<Vec<SessionSummary>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sessions = self.session_repo.list_by_ids(session_ids).await?;
        Ok(sessions.into_iter().map(Into::into).collect())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionDetail>> {
        let Some(session) = self.session_repo.get(session_id).await? else {
            return Ok(None);
        };
        let messages = self.message_repo.get_messages(session_id).await?;

        Ok(Some(SessionDetail {
            summary: session.into(),
            messages: messages.into_iter().map(Into::into).collect(),
        }))
    }

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<StoredMessage> {
        let placeholder = new_document(session_id, None, derive_title(&message.content));
        self.session_repo.insert_if_absent(&placeholder).await?;

        let document = MongoMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: message.role,
            content: message.content,
            tool_calls: message.tool_calls.filter(|calls| !calls.is_empty()),
            created_at: Utc::now(),
        };
        self.message_repo.save_message(&document).await?;

        self.session_repo
            .record_message(session_id, &derive_preview(&document.content))
            .await?;
        if document.role == Role::User {
            self.session_repo
                .retitle_if_default(session_id, &derive_title(&document.content))
                .await?;
        }

        Ok(document.into())
    }

    async fn update_title(&self, session_id: &str, title: &str) -> Result<()> {
        if self.session_repo.update_title(session_id, title).await? {
            Ok(())
        } else {
            Err(PersistError::SessionNotFound(session_id.to_string()))
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let removed = self.message_repo.delete_for_session(session_id).await?;
        let existed = self.session_repo.delete(session_id).await?;
        tracing::debug!(session_id, removed, existed, "Deleted session");
        Ok(existed)
    }

    async fn link_sessions_to_customer(
        &self,
        session_ids: &[String],
        customer_id: &str,
    ) -> Result<u64> {
        if session_ids.is_empty() {
            return Ok(0);
        }
        self.session_repo
            .claim_for_customer(session_ids, customer_id)
            .await
    }
}
