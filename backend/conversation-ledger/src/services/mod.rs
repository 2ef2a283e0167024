pub mod conversation_service;
pub mod directory;
pub mod message_service;

pub use conversation_service::ConversationStore;
pub use directory::{FileResolver, PgDirectory, ProfileResolver, StaticDirectory};
pub use message_service::MessageStore;
