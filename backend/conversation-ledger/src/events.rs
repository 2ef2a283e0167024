//! Ledger events for realtime fanout.
//!
//! Events use "object.action" names and serialize as
//! `{"type": "message.created", "data": {...}}`. Delivery is best effort:
//! stores hand events to [`emit_best_effort`], which logs sink failures and
//! never propagates them to the originating operation.

use crate::error::AppResult;
use crate::models::{Conversation, ConversationView, MessageView};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum LedgerEvent {
    #[serde(rename = "conversation.created")]
    ConversationCreated(ConversationView),

    /// The conversation's last-message pointer moved.
    #[serde(rename = "conversation.updated")]
    ConversationUpdated(Conversation),

    #[serde(rename = "message.created")]
    MessageCreated(MessageView),
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::ConversationCreated(_) => "conversation.created",
            LedgerEvent::ConversationUpdated(_) => "conversation.updated",
            LedgerEvent::MessageCreated(_) => "message.created",
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        match self {
            LedgerEvent::ConversationCreated(view) => view.id,
            LedgerEvent::ConversationUpdated(conversation) => conversation.id,
            LedgerEvent::MessageCreated(view) => view.conversation_id,
        }
    }

    pub fn to_payload(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Sink for ledger events.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: &LedgerEvent) -> AppResult<()>;
}

/// Hands `event` to `emitter`; a failing sink is logged, never surfaced.
pub async fn emit_best_effort(emitter: &dyn EventEmitter, event: LedgerEvent) {
    if let Err(e) = emitter.emit(&event).await {
        warn!(
            event = event.name(),
            conversation_id = %event.conversation_id(),
            error = %e,
            "failed to emit ledger event"
        );
    }
}

/// In-process fanout over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<LedgerEvent>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventEmitter for BroadcastEmitter {
    async fn emit(&self, event: &LedgerEvent) -> AppResult<()> {
        // No subscribers is not a failure.
        if self.tx.send(event.clone()).is_err() {
            debug!(event = event.name(), "no in-process subscribers");
        }
        Ok(())
    }
}

fn channel_for_conversation(id: Uuid) -> String {
    format!("conversation:{}", id)
}

/// Publishes events on `conversation:{id}` Redis channels for the
/// realtime gateway to pick up.
#[derive(Clone)]
pub struct RedisEventEmitter {
    conn: ConnectionManager,
}

impl RedisEventEmitter {
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EventEmitter for RedisEventEmitter {
    async fn emit(&self, event: &LedgerEvent) -> AppResult<()> {
        let payload = event.to_payload()?;
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel_for_conversation(event.conversation_id()), payload)
            .await?;
        Ok(())
    }
}

/// Forwards every event to each sink. All sinks are attempted; the first
/// error is returned.
#[derive(Clone, Default)]
pub struct FanoutEmitter {
    sinks: Vec<Arc<dyn EventEmitter>>,
}

impl FanoutEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventEmitter>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl EventEmitter for FanoutEmitter {
    async fn emit(&self, event: &LedgerEvent) -> AppResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
