//! Stream consumer and conversation state for Lendflow chat clients.
//!
//! Transports ([`SseTransport`], [`WsSession`]) turn the server's frames into
//! [`lendflow_types::ChatEvent`]s; [`ConversationReducer`] folds them into a
//! message log; [`ChatClient`] wires the two together with persistence.

pub mod chat;
pub mod compose;
pub mod context;
pub mod directory;
pub mod error;
pub mod reducer;
pub mod sse;
pub mod ws;

pub use chat::{ChatClient, ClientConfig, TransportKind, TurnCanceller};
pub use compose::annotate_with_document;
pub use context::{ContextStore, JsonFileContextStore, MemoryContextStore, SessionContext};
pub use directory::DirectoryClient;
pub use error::{ClientError, Result};
pub use reducer::{ConversationReducer, Effect, ReducerError};
pub use sse::{EventStream, SseFrameDecoder, SseTransport};
pub use ws::{ReconnectPolicy, WsSession};
