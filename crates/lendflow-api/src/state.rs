use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lendflow_agent::StreamProducer;
use lendflow_persist::SessionStore;
use uuid::Uuid;

use crate::config::Config;

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub producer: Arc<StreamProducer>,
    pub store: Arc<dyn SessionStore>,
    pub connections: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(config: Config, producer: StreamProducer, store: Arc<dyn SessionStore>) -> Self {
        Self {
            config: Arc::new(config),
            producer: Arc::new(producer),
            store,
            connections: Arc::new(ConnectionRegistry::default()),
        }
    }
}

/// Open WebSocket connections keyed by session id
///
/// A reconnect for the same session replaces the older entry; the older
/// socket's deregistration is then a no-op.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    active: Mutex<HashMap<String, Uuid>>,
}

impl ConnectionRegistry {
    pub fn register(&self, session_id: &str) -> Uuid {
        let connection_id = Uuid::new_v4();
        if let Ok(mut active) = self.active.lock() {
            if active.insert(session_id.to_string(), connection_id).is_some() {
                tracing::debug!(session_id, "Replacing existing connection");
            }
        }
        connection_id
    }

    pub fn unregister(&self, session_id: &str, connection_id: Uuid) {
        if let Ok(mut active) = self.active.lock() {
            if active.get(session_id) == Some(&connection_id) {
                active.remove(session_id);
            }
        }
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .map(|active| active.contains_key(session_id))
            .unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.active.lock().map(|active| active.len()).unwrap_or(0)
    }
}
