//! Conversation and message ledger for a chat backend.
//!
//! [`ConversationStore`] deduplicates and lists conversations,
//! [`MessageStore`] appends messages and tracks likes. Both write through the
//! repository traits in [`repository`] and announce changes through an
//! [`events::EventEmitter`].

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod query;
pub mod repository;
pub mod services;
pub mod state;

pub use error::{AppError, AppResult};
pub use services::{ConversationStore, MessageStore};
pub use state::{Ledger, LedgerDeps};
