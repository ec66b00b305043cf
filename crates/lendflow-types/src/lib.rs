pub mod events;
pub mod message;
pub mod request;
pub mod session;

pub use events::ChatEvent;
pub use message::{AgentDecision, Message, Role, ToolCall, ToolStatus};
pub use request::{ChatRequest, StreamQuery, DEFAULT_SESSION_ID};
pub use session::{
    NewMessage, NewSession, SessionDetail, SessionSummary, StoredMessage, DEFAULT_SESSION_TITLE,
};
