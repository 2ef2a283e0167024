use crate::config::PageDefaults;
use crate::error::{AppError, AppResult};
use crate::events::{emit_best_effort, EventEmitter, LedgerEvent};
use crate::models::{Conversation, ConversationSpec, ConversationView, Message, UserProfile};
use crate::query::{normalize_keyword, Page, PageRequest};
use crate::repository::{ConversationRepository, MessageRepository};
use crate::services::directory::ProfileResolver;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Owns conversation state: create-or-reuse, listing, search, read marker
/// and bulk removal.
#[derive(Clone)]
pub struct ConversationStore {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    profiles: Arc<dyn ProfileResolver>,
    events: Arc<dyn EventEmitter>,
    pages: PageDefaults,
}

impl ConversationStore {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        profiles: Arc<dyn ProfileResolver>,
        events: Arc<dyn EventEmitter>,
        pages: PageDefaults,
    ) -> Self {
        Self {
            conversations,
            messages,
            profiles,
            events,
            pages,
        }
    }

    /// Return the conversation matching `spec`, creating it if none exists.
    ///
    /// Groups are matched by display name, direct conversations by exact
    /// member set. An existing record is returned unmodified.
    /// Emits `conversation.created` only when a record was inserted.
    pub async fn resolve_or_create(
        &self,
        requester: Uuid,
        spec: ConversationSpec,
    ) -> AppResult<ConversationView> {
        spec.validate()?;

        let existing = match &spec {
            ConversationSpec::Group { display_name, .. } => {
                self.conversations.find_by_display_name(display_name).await?
            }
            ConversationSpec::Direct { member_ids } => {
                self.conversations.find_direct_by_members(member_ids).await?
            }
        };
        if let Some(existing) = existing {
            debug!(conversation_id = %existing.id, "reusing existing conversation");
            return self.expand_one(existing, None).await;
        }

        let candidate = Conversation::new(requester, spec, Utc::now());
        let (stored, created) = self.conversations.insert_or_get(candidate).await?;
        let view = self.expand_one(stored, None).await?;

        if created {
            info!(
                conversation_id = %view.id,
                owner_id = %requester,
                is_group = view.is_group,
                "conversation created"
            );
            emit_best_effort(
                self.events.as_ref(),
                LedgerEvent::ConversationCreated(view.clone()),
            )
            .await;
        }
        Ok(view)
    }

    /// Conversations of `requester`, most recently updated first.
    pub async fn list(
        &self,
        requester: Uuid,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> AppResult<Page<ConversationView>> {
        let request = PageRequest::new(page, page_size, self.pages.conversation_page_size);
        self.page(requester, None, request).await
    }

    /// Like [`list`](Self::list), restricted to conversations whose last
    /// message contains `keyword` (case-insensitive). A blank keyword lists
    /// everything.
    pub async fn search(
        &self,
        requester: Uuid,
        keyword: Option<&str>,
        page: Option<u32>,
    ) -> AppResult<Page<ConversationView>> {
        let keyword = normalize_keyword(keyword);
        let request = PageRequest::new(page, None, self.pages.conversation_page_size);
        self.page(requester, keyword.as_deref(), request).await
    }

    /// Fetch one conversation and advance its last-read marker.
    pub async fn open(&self, requester: Uuid, conversation_id: Uuid) -> AppResult<ConversationView> {
        let conversation = self
            .conversations
            .mark_read(conversation_id, Utc::now())
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        self.expand_one(conversation, Some(requester)).await
    }

    /// Every conversation `requester` shares with `other_user`, newest first.
    pub async fn common(&self, requester: Uuid, other_user: Uuid) -> AppResult<Vec<ConversationView>> {
        let conversations = self.conversations.list_shared(requester, other_user).await?;
        self.expand(conversations, Some(requester)).await
    }

    /// Permanently delete conversations. Their messages are left in place.
    pub async fn remove_many(&self, ids: &[Uuid]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.conversations.delete_many(ids).await?;
        info!(requested = ids.len(), removed, "conversations removed");
        Ok(removed)
    }

    async fn page(
        &self,
        requester: Uuid,
        keyword: Option<&str>,
        request: PageRequest,
    ) -> AppResult<Page<ConversationView>> {
        let (conversations, total) = self
            .conversations
            .page_for_member(requester, keyword, &request)
            .await?;
        let views = self.expand(conversations, Some(requester)).await?;
        Ok(Page::new(views, &request, total))
    }

    async fn expand_one(
        &self,
        conversation: Conversation,
        exclude: Option<Uuid>,
    ) -> AppResult<ConversationView> {
        self.expand(vec![conversation], exclude)
            .await?
            .pop()
            .ok_or(AppError::NotFound("conversation"))
    }

    /// Resolve member profiles and last messages in two batched lookups.
    /// `exclude` drops the viewer from the member list.
    async fn expand(
        &self,
        conversations: Vec<Conversation>,
        exclude: Option<Uuid>,
    ) -> AppResult<Vec<ConversationView>> {
        let member_ids: Vec<Uuid> = conversations
            .iter()
            .flat_map(|c| c.member_ids.iter().copied())
            .filter(|id| Some(*id) != exclude)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let profiles = self.profiles.resolve_profiles(&member_ids).await?;

        let last_ids: Vec<Uuid> = conversations
            .iter()
            .filter_map(|c| c.last_message_id)
            .collect();
        let last_messages: HashMap<Uuid, Message> = self
            .messages
            .find_many(&last_ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        Ok(conversations
            .into_iter()
            .map(|c| {
                let members: Vec<UserProfile> = c
                    .member_ids
                    .iter()
                    .filter(|id| Some(**id) != exclude)
                    .filter_map(|id| profiles.get(id).cloned())
                    .collect();
                let last_message = c.last_message_id.and_then(|id| {
                    let found = last_messages.get(&id).cloned();
                    if found.is_none() {
                        debug!(conversation_id = %c.id, message_id = %id, "last message pointer dangles");
                    }
                    found
                });
                ConversationView {
                    id: c.id,
                    is_group: c.is_group,
                    display_name: c.display_name,
                    avatar_ref: c.avatar_ref,
                    members,
                    owner_id: c.owner_id,
                    last_message,
                    last_read_at: c.last_read_at,
                    created_at: c.created_at,
                    updated_at: c.updated_at,
                }
            })
            .collect())
    }
}
