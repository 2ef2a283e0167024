mod memory;
mod postgres;

pub use memory::InMemoryLedger;
pub use postgres::PgLedgerRepository;

use crate::error::AppResult;
use crate::models::{Conversation, MemberSet, Message};
use crate::query::PageRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence for conversations.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Insert `conversation` unless its dedup key (display name for groups,
    /// member set for direct conversations) is already taken.
    /// Returns the stored record and whether it was newly created.
    async fn insert_or_get(&self, conversation: Conversation) -> AppResult<(Conversation, bool)>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn find_by_display_name(&self, display_name: &str) -> AppResult<Option<Conversation>>;

    /// Direct conversation whose member set equals `members` exactly.
    async fn find_direct_by_members(&self, members: &MemberSet) -> AppResult<Option<Conversation>>;

    /// Conversations containing `member`, newest `updated_at` first.
    /// With a keyword, only those whose last message content contains it
    /// (case-insensitive). Returns the page and the total match count.
    async fn page_for_member(
        &self,
        member: Uuid,
        keyword: Option<&str>,
        page: &PageRequest,
    ) -> AppResult<(Vec<Conversation>, u64)>;

    /// Every conversation containing both users, newest first.
    async fn list_shared(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Conversation>>;

    /// Point the conversation at its newest message and refresh
    /// `last_read_at`/`updated_at`. `None` when the conversation is gone.
    async fn record_last_message(
        &self,
        id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Conversation>>;

    /// Refresh `last_read_at`. `None` when the conversation is gone.
    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Conversation>>;

    async fn delete_many(&self, ids: &[Uuid]) -> AppResult<u64>;
}

/// Persistence for messages.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &Message) -> AppResult<()>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Messages that still exist among `ids`; missing ids are skipped.
    async fn find_many(&self, ids: &[Uuid]) -> AppResult<Vec<Message>>;

    /// Messages of a conversation, newest first, plus the total count.
    async fn page_for_conversation(
        &self,
        conversation_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<(Vec<Message>, u64)>;

    /// Add `user_id` to `liked_by` if absent. `None` when the message is gone.
    async fn add_like(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Message>>;

    /// Remove `user_id` from `liked_by` if present. `None` when the message is gone.
    async fn remove_like(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Message>>;

    async fn delete_many(&self, ids: &[Uuid]) -> AppResult<u64>;
}
