pub mod error;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod store;

pub use error::{PersistError, Result};
pub use memory::MemorySessionStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoSessionStore;
pub use store::{derive_preview, derive_title, CreatedSession, SessionStore, DEFAULT_LIST_LIMIT};
