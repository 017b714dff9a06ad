//! Persistence for sessions and messages.
//!
//! `PairingStore` is the seam between the relay operations and storage:
//! - **postgres** — production store; uniqueness and liveness enforced in SQL
//! - **memory** — single-process store for development and tests
//!
//! Every method is one self-contained unit of work. Implementations must make
//! `insert_session` and `insert_message` atomic with their checks.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::HandoffConfig;
use crate::error::HandoffError;
use crate::models::{Message, SenderType, Session};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of a retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_deactivated: u64,
    pub sessions_purged: u64,
    pub messages_purged: u64,
}

#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Insert an active session holding `code` for `ttl`.
    ///
    /// Returns `Ok(None)` when another live session already holds the code.
    /// An expired holder that is still flagged active is deactivated first.
    async fn insert_session(&self, code: &str, ttl: Duration) -> Result<Option<Session>, HandoffError>;

    /// The active, non-expired session holding `code`, if any.
    async fn find_live_session(&self, code: &str) -> Result<Option<Session>, HandoffError>;

    /// Append a message to a live session. Returns `Ok(None)` when the session
    /// is unknown, inactive or expired.
    async fn insert_message(
        &self,
        session_id: Uuid,
        content: &str,
        sender_type: SenderType,
    ) -> Result<Option<Message>, HandoffError>;

    /// All messages of a session in `(created_at, insertion)` order.
    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, HandoffError>;

    /// Deactivate expired sessions and delete those that expired before `purge_before`.
    async fn sweep(&self, purge_before: DateTime<Utc>) -> Result<SweepReport, HandoffError>;

    /// Liveness probe; returns a short description of the backend.
    async fn ping(&self) -> Result<String, HandoffError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Build the store selected by `store.backend`.
pub async fn create_store(config: &HandoffConfig) -> Result<Arc<dyn PairingStore>, HandoffError> {
    match config.store.backend.as_str() {
        "postgres" => {
            let pool = crate::db::connect_with_retry(&config.database).await?;
            if config.database.apply_schema {
                crate::db::apply_schema(&pool).await?;
            }
            tracing::info!(max_connections = config.database.max_connections, "Using postgres store");
            Ok(Arc::new(PgStore::new(pool)))
        }
        "memory" => {
            tracing::warn!("Using in-memory store — sessions are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => Err(HandoffError::Other(format!(
            "Unknown store backend '{}' (expected 'postgres' or 'memory')",
            other
        ))),
    }
}
