use crate::config::{Config, PageDefaults};
use crate::db;
use crate::error::AppResult;
use crate::events::{BroadcastEmitter, EventEmitter, FanoutEmitter, RedisEventEmitter};
use crate::repository::{ConversationRepository, InMemoryLedger, MessageRepository, PgLedgerRepository};
use crate::services::directory::{FileResolver, PgDirectory, ProfileResolver, StaticDirectory};
use crate::services::{ConversationStore, MessageStore};
use std::sync::Arc;
use tracing::info;

/// Collaborators shared by both stores.
#[derive(Clone)]
pub struct LedgerDeps {
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub profiles: Arc<dyn ProfileResolver>,
    pub files: Arc<dyn FileResolver>,
    pub events: Arc<dyn EventEmitter>,
    pub pages: PageDefaults,
}

#[derive(Clone)]
pub struct Ledger {
    pub conversations: ConversationStore,
    pub messages: MessageStore,
}

impl Ledger {
    pub fn new(deps: LedgerDeps) -> Self {
        let conversations = ConversationStore::new(
            deps.conversations.clone(),
            deps.messages.clone(),
            deps.profiles.clone(),
            deps.events.clone(),
            deps.pages,
        );
        let messages = MessageStore::new(
            deps.conversations,
            deps.messages,
            deps.profiles,
            deps.files,
            deps.events,
            deps.pages,
        );
        Self {
            conversations,
            messages,
        }
    }

    /// Ledger over a fresh [`InMemoryLedger`] and the given directory.
    pub fn in_memory(
        directory: Arc<StaticDirectory>,
        events: Arc<dyn EventEmitter>,
        pages: PageDefaults,
    ) -> Self {
        let storage = Arc::new(InMemoryLedger::new());
        Self::new(LedgerDeps {
            conversations: storage.clone(),
            messages: storage,
            profiles: directory.clone(),
            files: directory,
            events,
            pages,
        })
    }

    /// Connect to PostgreSQL (and Redis when configured). Returns the ledger
    /// together with the in-process broadcast sink so callers can subscribe.
    pub async fn connect(cfg: &Config) -> AppResult<(Self, Arc<BroadcastEmitter>)> {
        let pool = db::init_pool(&cfg.database_url, cfg.db_max_connections).await?;

        let broadcast = Arc::new(BroadcastEmitter::new(cfg.event_channel_capacity));
        let mut fanout = FanoutEmitter::new().with(broadcast.clone());
        if let Some(url) = cfg.redis_url.as_deref() {
            fanout = fanout.with(Arc::new(RedisEventEmitter::connect(url).await?));
            info!("redis event publishing enabled");
        }

        let repository = Arc::new(PgLedgerRepository::new(pool.clone()));
        repository.health_check().await?;
        let directory = Arc::new(PgDirectory::new(pool));
        let ledger = Self::new(LedgerDeps {
            conversations: repository.clone(),
            messages: repository,
            profiles: directory.clone(),
            files: directory,
            events: Arc::new(fanout),
            pages: cfg.pages,
        });
        Ok((ledger, broadcast))
    }
}
