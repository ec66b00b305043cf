use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identity and session bookkeeping handed to the chat client at
/// construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// Sessions created while anonymous, claimable after verification
    #[serde(default)]
    pub known_sessions: Vec<String>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        let mut context = Self {
            session_id: session_id.into(),
            customer_id: None,
            customer_name: None,
            known_sessions: Vec::new(),
        };
        context.remember(context.session_id.clone());
        context
    }

    /// Fresh context with a newly minted session id
    pub fn anonymous() -> Self {
        Self::new(new_session_id())
    }

    pub fn with_customer(
        mut self,
        customer_id: Option<String>,
        customer_name: Option<String>,
    ) -> Self {
        self.customer_id = customer_id.filter(|id| !id.is_empty());
        self.customer_name = customer_name.filter(|name| !name.is_empty());
        self
    }

    pub fn is_identified(&self) -> bool {
        self.customer_id.is_some()
    }

    /// Switch to a brand-new session, returning its id
    pub fn start_new_session(&mut self) -> String {
        self.switch_to(new_session_id());
        self.session_id.clone()
    }

    pub fn switch_to(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
        self.remember(self.session_id.clone());
    }

    fn remember(&mut self, session_id: String) {
        if !self.known_sessions.contains(&session_id) {
            self.known_sessions.push(session_id);
        }
    }
}

pub fn new_session_id() -> String {
    format!("session_{}", uuid::Uuid::new_v4().simple())
}

/// Where the client keeps its `SessionContext` between runs
pub trait ContextStore: Send + Sync {
    fn load(&self) -> Result<Option<SessionContext>>;
    fn save(&self, context: &SessionContext) -> Result<()>;
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct JsonFileContextStore {
    path: PathBuf,
}

impl JsonFileContextStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContextStore for JsonFileContextStore {
    fn load(&self) -> Result<Option<SessionContext>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str(&raw) {
            Ok(context) => Ok(Some(context)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Ignoring unreadable session context: {}",
                    e
                );
                Ok(None)
            }
        }
    }

    fn save(&self, context: &SessionContext) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(context)?)?;
        Ok(())
    }
}

/// Keeps the context in memory only
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    slot: Mutex<Option<SessionContext>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextStore for MemoryContextStore {
    fn load(&self) -> Result<Option<SessionContext>> {
        Ok(self.slot.lock().map(|slot| slot.clone()).unwrap_or_default())
    }

    fn save(&self, context: &SessionContext) -> Result<()> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(context.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sessions_are_remembered_once() {
        let mut context = SessionContext::new("s1");
        context.switch_to("s1");
        let second = context.start_new_session();

        assert!(second.starts_with("session_"));
        assert_eq!(context.known_sessions, vec!["s1".to_string(), second]);
    }

    #[test]
    fn test_blank_identity_is_anonymous() {
        let context =
            SessionContext::new("s1").with_customer(Some(String::new()), Some("Rahul".into()));
        assert!(!context.is_identified());
    }

    #[test]
    fn test_json_file_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("lendflow-context-{}", uuid::Uuid::new_v4()))
            .join("context.json");
        let store = JsonFileContextStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let context = SessionContext::new("s1").with_customer(Some("CUST001".into()), None);
        store.save(&context).unwrap();
        assert_eq!(store.load().unwrap(), Some(context));

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryContextStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&SessionContext::new("s1")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().session_id, "s1");
    }
}
