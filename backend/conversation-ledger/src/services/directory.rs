//! Read-only lookups of user profiles and attachments.
//!
//! Both are owned by other services; the ledger only uses them to expand
//! ids into display data. Unknown ids are left out of the result instead of
//! failing the lookup.

use crate::error::AppResult;
use crate::models::{FileRef, UserProfile};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// Batch lookup; avoids one round trip per member.
    async fn resolve_profiles(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserProfile>>;

    async fn resolve_profile(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.resolve_profiles(&[id]).await?.remove(&id))
    }
}

#[async_trait]
pub trait FileResolver: Send + Sync {
    async fn resolve_files(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, FileRef>>;
}

/// Directory backed by the `users` and `files` tables.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileResolver for PgDirectory {
    async fn resolve_profiles(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserProfile>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT id, full_name, profile_picture FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        let mut profiles = HashMap::with_capacity(rows.len());
        for row in rows {
            let profile = UserProfile {
                id: row.try_get("id")?,
                full_name: row.try_get("full_name")?,
                profile_picture: row.try_get("profile_picture")?,
            };
            profiles.insert(profile.id, profile);
        }
        Ok(profiles)
    }
}

#[async_trait]
impl FileResolver for PgDirectory {
    async fn resolve_files(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, FileRef>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT id, url, mime_type FROM files WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        let mut files = HashMap::with_capacity(rows.len());
        for row in rows {
            let file = FileRef {
                id: row.try_get("id")?,
                url: row.try_get("url")?,
                mime_type: row.try_get("mime_type")?,
            };
            files.insert(file.id, file);
        }
        Ok(files)
    }
}

/// In-process directory for tests and embedded use.
#[derive(Default)]
pub struct StaticDirectory {
    users: RwLock<HashMap<Uuid, UserProfile>>,
    files: RwLock<HashMap<Uuid, FileRef>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
            files: RwLock::default(),
        }
    }

    pub async fn insert_user(&self, profile: UserProfile) {
        self.users.write().await.insert(profile.id, profile);
    }

    pub async fn insert_file(&self, file: FileRef) {
        self.files.write().await.insert(file.id, file);
    }
}

#[async_trait]
impl ProfileResolver for StaticDirectory {
    async fn resolve_profiles(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserProfile>> {
        let users = self.users.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| users.get(id).map(|u| (*id, u.clone())))
            .collect())
    }
}

#[async_trait]
impl FileResolver for StaticDirectory {
    async fn resolve_files(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, FileRef>> {
        let files = self.files.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| files.get(id).map(|f| (*id, f.clone())))
            .collect())
    }
}
