use super::{ConversationRepository, MessageRepository};
use crate::error::AppResult;
use crate::models::{Conversation, MemberSet, Message};
use crate::query::{keyword_matches, PageRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Insertion sequence breaks ties between equal timestamps.
struct Stored<T> {
    seq: u64,
    value: T,
}

#[derive(Default)]
struct LedgerState {
    next_seq: u64,
    conversations: HashMap<Uuid, Stored<Conversation>>,
    messages: HashMap<Uuid, Stored<Message>>,
}

impl LedgerState {
    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn duplicate_of(&self, candidate: &Conversation) -> Option<&Conversation> {
        self.conversations
            .values()
            .map(|stored| &stored.value)
            .find(|existing| match &candidate.display_name {
                Some(name) => existing.display_name.as_deref() == Some(name.as_str()),
                None => !existing.is_group && existing.member_ids == candidate.member_ids,
            })
    }

    fn last_message_content(&self, conversation: &Conversation) -> Option<&str> {
        conversation
            .last_message_id
            .and_then(|id| self.messages.get(&id))
            .and_then(|stored| stored.value.content.as_deref())
    }

    /// Conversations matching `filter`, newest `updated_at` first.
    fn conversations_by_recency<F>(&self, filter: F) -> Vec<Conversation>
    where
        F: Fn(&Conversation) -> bool,
    {
        let mut matched: Vec<&Stored<Conversation>> = self
            .conversations
            .values()
            .filter(|stored| filter(&stored.value))
            .collect();
        matched.sort_by_key(|stored| Reverse((stored.value.updated_at, stored.seq)));
        matched.into_iter().map(|s| s.value.clone()).collect()
    }
}

/// Process-local ledger implementing both repositories over one lock.
///
/// Enforces the same uniqueness keys as the PostgreSQL schema, so
/// concurrent resolve-or-create calls cannot produce duplicates.
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.read().await.conversations.len()
    }

    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }
}

/// Same bounds as the SQL window, so both stores reject the same pages.
fn paginate<T>(items: Vec<T>, page: &PageRequest) -> AppResult<(Vec<T>, u64)> {
    let (limit, offset) = page.sql_window()?;
    let total = items.len() as u64;
    let skip = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    Ok((items.into_iter().skip(skip).take(limit).collect(), total))
}

#[async_trait]
impl ConversationRepository for InMemoryLedger {
    async fn insert_or_get(&self, conversation: Conversation) -> AppResult<(Conversation, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.duplicate_of(&conversation) {
            return Ok((existing.clone(), false));
        }
        let seq = state.bump();
        state.conversations.insert(
            conversation.id,
            Stored {
                seq,
                value: conversation.clone(),
            },
        );
        Ok((conversation, true))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let state = self.state.read().await;
        Ok(state.conversations.get(&id).map(|s| s.value.clone()))
    }

    async fn find_by_display_name(&self, display_name: &str) -> AppResult<Option<Conversation>> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .values()
            .map(|s| &s.value)
            .find(|c| c.display_name.as_deref() == Some(display_name))
            .cloned())
    }

    async fn find_direct_by_members(&self, members: &MemberSet) -> AppResult<Option<Conversation>> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .values()
            .map(|s| &s.value)
            .find(|c| !c.is_group && &c.member_ids == members)
            .cloned())
    }

    async fn page_for_member(
        &self,
        member: Uuid,
        keyword: Option<&str>,
        page: &PageRequest,
    ) -> AppResult<(Vec<Conversation>, u64)> {
        let state = self.state.read().await;
        let matched = state.conversations_by_recency(|c| {
            c.has_member(&member)
                && keyword
                    .map(|k| keyword_matches(state.last_message_content(c), k))
                    .unwrap_or(true)
        });
        paginate(matched, page)
    }

    async fn list_shared(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Conversation>> {
        let state = self.state.read().await;
        Ok(state.conversations_by_recency(|c| c.has_member(&a) && c.has_member(&b)))
    }

    async fn record_last_message(
        &self,
        id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Conversation>> {
        let mut state = self.state.write().await;
        Ok(state.conversations.get_mut(&id).map(|stored| {
            stored.value.last_message_id = Some(message_id);
            stored.value.last_read_at = at;
            stored.value.updated_at = at;
            stored.value.clone()
        }))
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Conversation>> {
        let mut state = self.state.write().await;
        Ok(state.conversations.get_mut(&id).map(|stored| {
            stored.value.last_read_at = at;
            stored.value.clone()
        }))
    }

    async fn delete_many(&self, ids: &[Uuid]) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let removed = ids
            .iter()
            .filter(|id| state.conversations.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }
}

#[async_trait]
impl MessageRepository for InMemoryLedger {
    async fn insert(&self, message: &Message) -> AppResult<()> {
        let mut state = self.state.write().await;
        let seq = state.bump();
        state.messages.insert(
            message.id,
            Stored {
                seq,
                value: message.clone(),
            },
        );
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state.messages.get(&id).map(|s| s.value.clone()))
    }

    async fn find_many(&self, ids: &[Uuid]) -> AppResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.messages.get(id))
            .map(|s| s.value.clone())
            .collect())
    }

    async fn page_for_conversation(
        &self,
        conversation_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<(Vec<Message>, u64)> {
        let state = self.state.read().await;
        let mut matched: Vec<&Stored<Message>> = state
            .messages
            .values()
            .filter(|s| s.value.conversation_id == conversation_id)
            .collect();
        matched.sort_by_key(|s| Reverse((s.value.created_at, s.seq)));
        let messages = matched.into_iter().map(|s| s.value.clone()).collect();
        paginate(messages, page)
    }

    async fn add_like(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Message>> {
        let mut state = self.state.write().await;
        Ok(state.messages.get_mut(&id).map(|stored| {
            if stored.value.add_like(user_id) {
                stored.value.updated_at = Utc::now();
            }
            stored.value.clone()
        }))
    }

    async fn remove_like(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Message>> {
        let mut state = self.state.write().await;
        Ok(state.messages.get_mut(&id).map(|stored| {
            if stored.value.remove_like(user_id) {
                stored.value.updated_at = Utc::now();
            }
            stored.value.clone()
        }))
    }

    async fn delete_many(&self, ids: &[Uuid]) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let removed = ids
            .iter()
            .filter(|id| state.messages.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }
}
