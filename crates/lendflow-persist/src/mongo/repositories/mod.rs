pub mod message;
pub mod session;

pub use message::MongoMessageRepository;
pub use session::MongoSessionRepository;
