//! The four relay operations: create/resolve a session, append/list messages.
//!
//! Input validation happens here, before the store is touched. Storage
//! invariants (code uniqueness, session liveness) are the store's job.

use chrono::Duration;
use uuid::Uuid;

use crate::code;
use crate::config::{SessionConfig, MAX_MINUTES};
use crate::error::HandoffError;
use crate::models::{Message, NewSession, SenderType, SessionHandle};
use crate::store::PairingStore;

/// Parameters for session creation, taken from `[session]` config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub max_code_attempts: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            ttl: Duration::minutes(config.ttl_minutes.clamp(1, MAX_MINUTES) as i64),
            max_code_attempts: config.max_code_attempts.max(1),
        }
    }
}

pub async fn create_session(
    store: &dyn PairingStore,
    settings: &SessionSettings,
) -> Result<NewSession, HandoffError> {
    create_session_with(store, settings, code::generate).await
}

/// `create_session` with an injectable code source.
pub async fn create_session_with<G>(
    store: &dyn PairingStore,
    settings: &SessionSettings,
    mut next_code: G,
) -> Result<NewSession, HandoffError>
where
    G: FnMut() -> String + Send,
{
    for attempt in 1..=settings.max_code_attempts {
        let code = next_code();
        match store.insert_session(&code, settings.ttl).await? {
            Some(session) => {
                tracing::info!(
                    session_id = %session.id,
                    code = %session.session_code,
                    attempt,
                    "Session created"
                );
                return Ok(NewSession::from(&session));
            }
            None => {
                tracing::debug!(code = %code, attempt, "Session code collision, regenerating");
            }
        }
    }

    tracing::warn!(
        attempts = settings.max_code_attempts,
        "Could not find a free session code"
    );
    Err(HandoffError::CollisionExhausted {
        attempts: settings.max_code_attempts,
    })
}

pub async fn resolve_session(store: &dyn PairingStore, raw_code: &str) -> Result<SessionHandle, HandoffError> {
    let code = code::normalize(raw_code);
    if code.is_empty() {
        return Err(HandoffError::invalid("Session code is required"));
    }
    if !code::is_well_formed(&code) {
        return Err(HandoffError::NotFound);
    }

    match store.find_live_session(&code).await? {
        Some(session) => Ok(session.handle()),
        None => Err(HandoffError::NotFound),
    }
}

pub async fn append_message(
    store: &dyn PairingStore,
    session_id: Uuid,
    content: &str,
    sender_type: &str,
) -> Result<Message, HandoffError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(HandoffError::invalid("Message content must not be empty"));
    }
    let sender_type: SenderType = sender_type.parse().map_err(HandoffError::InvalidInput)?;

    match store.insert_message(session_id, content, sender_type).await? {
        Some(message) => {
            tracing::debug!(
                session_id = %session_id,
                message_id = %message.id,
                sender = %sender_type,
                "Message appended"
            );
            Ok(message)
        }
        None => Err(HandoffError::NotFound),
    }
}

pub async fn list_messages(store: &dyn PairingStore, session_id: Uuid) -> Result<Vec<Message>, HandoffError> {
    store.list_messages(session_id).await
}
