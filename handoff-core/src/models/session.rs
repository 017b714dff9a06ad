use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub session_code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Usable for lookups and appends at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session_id: self.id,
            session_code: self.session_code.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Returned to the creator of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_id: Uuid,
    pub session_code: String,
}

impl From<&Session> for NewSession {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.id,
            session_code: s.session_code.clone(),
        }
    }
}

/// Returned to a client that resolved a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub session_code: String,
    pub expires_at: DateTime<Utc>,
}
