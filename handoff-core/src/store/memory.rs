use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PairingStore, SweepReport};
use crate::clock::{Clock, SystemClock};
use crate::error::HandoffError;
use crate::models::{Message, SenderType, Session};

/// Single-process store. All checks and writes happen under one lock, which
/// plays the role the unique index and row locks play in Postgres.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    sessions: Vec<Session>,
    messages: Vec<StoredMessage>,
    next_seq: u64,
}

struct StoredMessage {
    seq: u64,
    message: Message,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Flip `is_active` off without touching expiry.
    pub async fn deactivate(&self, session_id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        match state.sessions.iter_mut().find(|s| s.id == session_id) {
            Some(s) => {
                s.is_active = false;
                true
            }
            None => false,
        }
    }

    /// Every stored session, live or not.
    pub async fn sessions(&self) -> Vec<Session> {
        self.state.lock().await.sessions.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PairingStore for MemoryStore {
    async fn insert_session(&self, code: &str, ttl: Duration) -> Result<Option<Session>, HandoffError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        for holder in state
            .sessions
            .iter_mut()
            .filter(|s| s.is_active && s.session_code == code)
        {
            if holder.expires_at > now {
                return Ok(None);
            }
            holder.is_active = false;
        }

        let session = Session {
            id: Uuid::new_v4(),
            session_code: code.to_string(),
            is_active: true,
            created_at: now,
            expires_at: now + ttl,
        };
        state.sessions.push(session.clone());
        Ok(Some(session))
    }

    async fn find_live_session(&self, code: &str) -> Result<Option<Session>, HandoffError> {
        let state = self.state.lock().await;
        let now = self.clock.now();
        Ok(state
            .sessions
            .iter()
            .find(|s| s.session_code == code && s.is_live(now))
            .cloned())
    }

    async fn insert_message(
        &self,
        session_id: Uuid,
        content: &str,
        sender_type: SenderType,
    ) -> Result<Option<Message>, HandoffError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if !state.sessions.iter().any(|s| s.id == session_id && s.is_live(now)) {
            return Ok(None);
        }

        let message = Message {
            id: Uuid::new_v4(),
            session_id,
            content: content.to_string(),
            sender_type,
            created_at: now,
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.messages.push(StoredMessage {
            seq,
            message: message.clone(),
        });
        Ok(Some(message))
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, HandoffError> {
        let state = self.state.lock().await;
        let mut rows: Vec<&StoredMessage> = state
            .messages
            .iter()
            .filter(|m| m.message.session_id == session_id)
            .collect();
        rows.sort_by_key(|m| (m.message.created_at, m.seq));
        Ok(rows.into_iter().map(|m| m.message.clone()).collect())
    }

    async fn sweep(&self, purge_before: DateTime<Utc>) -> Result<SweepReport, HandoffError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for s in state
            .sessions
            .iter_mut()
            .filter(|s| s.is_active && s.expires_at <= now)
        {
            s.is_active = false;
            report.sessions_deactivated += 1;
        }

        let purged: HashSet<Uuid> = state
            .sessions
            .iter()
            .filter(|s| s.expires_at <= purge_before)
            .map(|s| s.id)
            .collect();
        if purged.is_empty() {
            return Ok(report);
        }

        let before = state.messages.len();
        state.messages.retain(|m| !purged.contains(&m.message.session_id));
        report.messages_purged = (before - state.messages.len()) as u64;

        state.sessions.retain(|s| !purged.contains(&s.id));
        report.sessions_purged = purged.len() as u64;

        Ok(report)
    }

    async fn ping(&self) -> Result<String, HandoffError> {
        let state = self.state.lock().await;
        Ok(format!(
            "in-memory store ({} sessions, {} messages)",
            state.sessions.len(),
            state.messages.len()
        ))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
