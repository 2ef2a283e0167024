use crate::config::PageDefaults;
use crate::error::{AppError, AppResult};
use crate::events::{emit_best_effort, EventEmitter, LedgerEvent};
use crate::models::{Message, MessagePayload, MessageView, ReplyView};
use crate::query::{Page, PageRequest};
use crate::repository::{ConversationRepository, MessageRepository};
use crate::services::directory::{FileResolver, ProfileResolver};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Appends messages to conversations and maintains likes.
#[derive(Clone)]
pub struct MessageStore {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    profiles: Arc<dyn ProfileResolver>,
    files: Arc<dyn FileResolver>,
    events: Arc<dyn EventEmitter>,
    pages: PageDefaults,
}

impl MessageStore {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        profiles: Arc<dyn ProfileResolver>,
        files: Arc<dyn FileResolver>,
        events: Arc<dyn EventEmitter>,
        pages: PageDefaults,
    ) -> Self {
        Self {
            conversations,
            messages,
            profiles,
            files,
            events,
            pages,
        }
    }

    /// Persist a message from `requester` and move the conversation's
    /// last-message pointer to it.
    ///
    /// The message insert and the pointer update are separate writes. If the
    /// conversation disappears in between, the message is still returned and
    /// the pointer is simply not moved.
    pub async fn append(
        &self,
        requester: Uuid,
        conversation_id: Uuid,
        payload: MessagePayload,
    ) -> AppResult<MessageView> {
        payload.validate()?;

        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        let now = Utc::now();
        let message = Message::new(conversation.id, requester, payload, now);
        self.messages.insert(&message).await?;

        let updated = self
            .conversations
            .record_last_message(conversation.id, message.id, now)
            .await?;
        if updated.is_none() {
            warn!(
                conversation_id = %conversation.id,
                message_id = %message.id,
                "conversation vanished before last message pointer update"
            );
        }

        info!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            sender_id = %requester,
            kind = %message.kind,
            "message appended"
        );

        let mut view = self.expand_one(message).await?;
        view.conversation = updated.clone();

        emit_best_effort(self.events.as_ref(), LedgerEvent::MessageCreated(view.clone())).await;
        if let Some(conversation) = updated {
            emit_best_effort(
                self.events.as_ref(),
                LedgerEvent::ConversationUpdated(conversation),
            )
            .await;
        }
        Ok(view)
    }

    /// Messages of a conversation, newest first. `limit` defaults to the
    /// configured message page limit.
    pub async fn list(
        &self,
        conversation_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> AppResult<Page<MessageView>> {
        let request = PageRequest::new(page, limit, self.pages.message_page_limit);
        let (messages, total) = self
            .messages
            .page_for_conversation(conversation_id, &request)
            .await?;
        let views = self.expand(messages).await?;
        Ok(Page::new(views, &request, total))
    }

    pub async fn get(&self, message_id: Uuid) -> AppResult<MessageView> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;
        self.expand_one(message).await
    }

    /// Add `user_id` to the message's likes. Liking twice is a no-op.
    pub async fn like(&self, message_id: Uuid, user_id: Uuid) -> AppResult<Message> {
        self.messages
            .add_like(message_id, user_id)
            .await?
            .ok_or(AppError::NotFound("message"))
    }

    /// Remove `user_id` from the message's likes, if present.
    pub async fn unlike(&self, message_id: Uuid, user_id: Uuid) -> AppResult<Message> {
        self.messages
            .remove_like(message_id, user_id)
            .await?
            .ok_or(AppError::NotFound("message"))
    }

    /// Permanently delete messages. Conversation pointers to them are left
    /// as they are and resolve to nothing on read.
    pub async fn remove_many(&self, ids: &[Uuid]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.messages.delete_many(ids).await?;
        info!(requested = ids.len(), removed, "messages removed");
        Ok(removed)
    }

    async fn expand_one(&self, message: Message) -> AppResult<MessageView> {
        self.expand(vec![message])
            .await?
            .pop()
            .ok_or(AppError::NotFound("message"))
    }

    /// Resolve senders, reply targets and attachments with one batched
    /// lookup each.
    async fn expand(&self, messages: Vec<Message>) -> AppResult<Vec<MessageView>> {
        let user_ids: HashSet<Uuid> = messages
            .iter()
            .flat_map(|m| std::iter::once(m.sender_id).chain(m.reply_to.map(|r| r.user_id)))
            .collect();
        let user_ids: Vec<Uuid> = user_ids.into_iter().collect();
        let profiles = self.profiles.resolve_profiles(&user_ids).await?;

        let reply_ids: Vec<Uuid> = messages
            .iter()
            .filter_map(|m| m.reply_to.map(|r| r.message_id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let replies: HashMap<Uuid, Message> = self
            .messages
            .find_many(&reply_ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let file_ids: Vec<Uuid> = messages
            .iter()
            .filter_map(|m| m.file_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let files = self.files.resolve_files(&file_ids).await?;

        Ok(messages
            .into_iter()
            .map(|m| MessageView {
                id: m.id,
                conversation_id: m.conversation_id,
                kind: m.kind,
                sender: profiles.get(&m.sender_id).cloned(),
                sender_id: m.sender_id,
                liked_by: m.liked_by,
                reply_to: m.reply_to.map(|r| ReplyView {
                    message_id: r.message_id,
                    user_id: r.user_id,
                    message: replies.get(&r.message_id).cloned(),
                    user: profiles.get(&r.user_id).cloned(),
                }),
                file: m.file_id.and_then(|id| files.get(&id).cloned()),
                file_id: m.file_id,
                content: m.content,
                deleted: m.deleted,
                created_at: m.created_at,
                updated_at: m.updated_at,
                conversation: None,
            })
            .collect())
    }
}
