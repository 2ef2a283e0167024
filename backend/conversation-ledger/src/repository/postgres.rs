use super::{ConversationRepository, MessageRepository};
use crate::error::AppResult;
use crate::models::{Conversation, MemberSet, Message, MessageKind, ReplyRef};
use crate::query::{ilike_pattern, PageRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "c.id, c.is_group, c.display_name, c.avatar_ref, c.member_ids, \
     c.owner_id, c.last_message_id, c.last_read_at, c.created_at, c.updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, kind, content, sender_id, liked_by, \
     reply_to_message_id, reply_to_user_id, file_id, deleted, created_at, updated_at";

/// PostgreSQL-backed conversations and messages.
#[derive(Clone)]
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn conversation_from_row(row: &PgRow) -> Result<Conversation, sqlx::Error> {
    let member_ids: Vec<Uuid> = row.try_get("member_ids")?;
    Ok(Conversation {
        id: row.try_get("id")?,
        is_group: row.try_get("is_group")?,
        display_name: row.try_get("display_name")?,
        avatar_ref: row.try_get("avatar_ref")?,
        member_ids: MemberSet::new(member_ids),
        owner_id: row.try_get("owner_id")?,
        last_message_id: row.try_get("last_message_id")?,
        last_read_at: row.try_get("last_read_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn message_from_row(row: &PgRow) -> Result<Message, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let kind = kind
        .parse::<MessageKind>()
        .map_err(|e| sqlx::Error::Decode(e.to_string().into()))?;

    let reply_message: Option<Uuid> = row.try_get("reply_to_message_id")?;
    let reply_user: Option<Uuid> = row.try_get("reply_to_user_id")?;
    let reply_to = match (reply_message, reply_user) {
        (Some(message_id), Some(user_id)) => Some(ReplyRef {
            message_id,
            user_id,
        }),
        _ => None,
    };

    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        kind,
        content: row.try_get("content")?,
        sender_id: row.try_get("sender_id")?,
        liked_by: row.try_get("liked_by")?,
        reply_to,
        file_id: row.try_get("file_id")?,
        deleted: row.try_get("deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PgLedgerRepository {
    async fn fetch_conversation(&self, sql: &str, bind: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query(sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(conversation_from_row).transpose()?)
    }

    async fn fetch_message(&self, sql: &str, id: Uuid, user_id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query(sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(message_from_row).transpose()?)
    }
}

#[async_trait]
impl ConversationRepository for PgLedgerRepository {
    async fn insert_or_get(&self, conversation: Conversation) -> AppResult<(Conversation, bool)> {
        // The partial unique indexes on display_name and member_key decide
        // the winner when two creators race.
        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations (
                id, is_group, display_name, avatar_ref, member_ids, member_key,
                owner_id, last_message_id, last_read_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.is_group)
        .bind(&conversation.display_name)
        .bind(&conversation.avatar_ref)
        .bind(conversation.member_ids.as_slice())
        .bind(conversation.member_ids.key())
        .bind(conversation.owner_id)
        .bind(conversation.last_message_id)
        .bind(conversation.last_read_at)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            debug!(conversation_id = %conversation.id, "conversation inserted");
            return Ok((conversation, true));
        }

        let existing = match &conversation.display_name {
            Some(name) => self.find_by_display_name(name).await?,
            None => self.find_direct_by_members(&conversation.member_ids).await?,
        };
        match existing {
            Some(existing) => Ok((existing, false)),
            None => Err(crate::error::AppError::Storage(format!(
                "conversation {} conflicted but no existing record was found",
                conversation.id
            ))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = $1");
        self.fetch_conversation(&sql, id).await
    }

    async fn find_by_display_name(&self, display_name: &str) -> AppResult<Option<Conversation>> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.display_name = $1 LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(display_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(conversation_from_row).transpose()?)
    }

    async fn find_direct_by_members(&self, members: &MemberSet) -> AppResult<Option<Conversation>> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c \
             WHERE c.is_group = FALSE AND c.member_key = $1 LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(members.key())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(conversation_from_row).transpose()?)
    }

    async fn page_for_member(
        &self,
        member: Uuid,
        keyword: Option<&str>,
        page: &PageRequest,
    ) -> AppResult<(Vec<Conversation>, u64)> {
        let pattern = keyword.map(ilike_pattern);
        let filter = r#"
            FROM conversations c
            LEFT JOIN messages m ON m.id = c.last_message_id
            WHERE $1 = ANY(c.member_ids)
              AND ($2::text IS NULL OR m.content ILIKE $2)
        "#;

        let (limit, offset) = page.sql_window()?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {filter}"))
            .bind(member)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} {filter} \
             ORDER BY c.updated_at DESC, c.id DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&sql)
            .bind(member)
            .bind(&pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let conversations = rows
            .iter()
            .map(conversation_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((conversations, total.max(0) as u64))
    }

    async fn list_shared(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Conversation>> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c \
             WHERE c.member_ids @> ARRAY[$1, $2]::uuid[] \
             ORDER BY c.updated_at DESC, c.id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(a)
            .bind(b)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(conversation_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn record_last_message(
        &self,
        id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Conversation>> {
        let sql = format!(
            "UPDATE conversations c \
             SET last_message_id = $2, last_read_at = $3, updated_at = $3 \
             WHERE c.id = $1 RETURNING {CONVERSATION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(message_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(conversation_from_row).transpose()?)
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Conversation>> {
        let sql = format!(
            "UPDATE conversations c SET last_read_at = $2 \
             WHERE c.id = $1 RETURNING {CONVERSATION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(conversation_from_row).transpose()?)
    }

    async fn delete_many(&self, ids: &[Uuid]) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MessageRepository for PgLedgerRepository {
    async fn insert(&self, message: &Message) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, kind, content, sender_id, liked_by,
                reply_to_message_id, reply_to_user_id, file_id, deleted,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.kind.as_str())
        .bind(&message.content)
        .bind(message.sender_id)
        .bind(&message.liked_by)
        .bind(message.reply_to.map(|r| r.message_id))
        .bind(message.reply_to.map(|r| r.user_id))
        .bind(message.file_id)
        .bind(message.deleted)
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(message_from_row).transpose()?)
    }

    async fn find_many(&self, ids: &[Uuid]) -> AppResult<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ANY($1)");
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn page_for_conversation(
        &self,
        conversation_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<(Vec<Message>, u64)> {
        let (limit, offset) = page.sql_window()?;
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((messages, total.max(0) as u64))
    }

    async fn add_like(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Message>> {
        let sql = format!(
            "UPDATE messages SET \
                 liked_by = CASE WHEN $2 = ANY(liked_by) THEN liked_by ELSE array_append(liked_by, $2) END, \
                 updated_at = CASE WHEN $2 = ANY(liked_by) THEN updated_at ELSE NOW() END \
             WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        );
        self.fetch_message(&sql, id, user_id).await
    }

    async fn remove_like(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Message>> {
        let sql = format!(
            "UPDATE messages SET \
                 liked_by = array_remove(liked_by, $2), \
                 updated_at = CASE WHEN $2 = ANY(liked_by) THEN NOW() ELSE updated_at END \
             WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        );
        self.fetch_message(&sql, id, user_id).await
    }

    async fn delete_many(&self, ids: &[Uuid]) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
