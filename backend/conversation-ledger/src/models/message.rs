use crate::error::{AppError, AppResult};
use crate::models::conversation::Conversation;
use crate::models::profile::{FileRef, UserProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Audio => "audio",
            MessageKind::File => "file",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "video" => Ok(MessageKind::Video),
            "audio" => Ok(MessageKind::Audio),
            "file" => Ok(MessageKind::File),
            other => Err(AppError::Validation(format!("unknown message kind: {other}"))),
        }
    }
}

/// Pointer to an earlier message and its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub message_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub sender_id: Uuid,
    pub liked_by: Vec<Uuid>,
    pub reply_to: Option<ReplyRef>,
    pub file_id: Option<Uuid>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        payload: MessagePayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            kind: payload.kind,
            content: payload.content,
            sender_id,
            liked_by: Vec::new(),
            reply_to: payload.reply_to,
            file_id: payload.file_id,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true when the like was not already present.
    pub fn add_like(&mut self, user_id: Uuid) -> bool {
        if self.liked_by.contains(&user_id) {
            return false;
        }
        self.liked_by.push(user_id);
        true
    }

    /// Returns true when a like was removed.
    pub fn remove_like(&mut self, user_id: Uuid) -> bool {
        let before = self.liked_by.len();
        self.liked_by.retain(|id| *id != user_id);
        self.liked_by.len() != before
    }
}

/// Caller-supplied part of a new message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePayload {
    pub content: Option<String>,
    #[serde(default)]
    pub kind: MessageKind,
    pub reply_to: Option<ReplyRef>,
    pub file_id: Option<Uuid>,
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn replying_to(mut self, message_id: Uuid, user_id: Uuid) -> Self {
        self.reply_to = Some(ReplyRef {
            message_id,
            user_id,
        });
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        let has_content = self
            .content
            .as_deref()
            .map(|content| !content.trim().is_empty())
            .unwrap_or(false);
        if !has_content && self.file_id.is_none() {
            return Err(AppError::Validation(
                "message needs content or a file".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyView {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub message: Option<Message>,
    pub user: Option<UserProfile>,
}

/// Message with sender, reply target and attachment resolved.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub sender_id: Uuid,
    pub sender: Option<UserProfile>,
    pub liked_by: Vec<Uuid>,
    pub reply_to: Option<ReplyView>,
    pub file_id: Option<Uuid>,
    pub file: Option<FileRef>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Conversation>,
}
