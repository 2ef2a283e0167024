pub mod conversation;
pub mod message;
pub mod profile;

pub use conversation::{
    Conversation, ConversationSpec, ConversationView, CreateConversationRequest, MemberSet,
};
pub use message::{Message, MessageKind, MessagePayload, MessageView, ReplyRef, ReplyView};
pub use profile::{FileRef, UserProfile};
