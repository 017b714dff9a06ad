use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{PairingStore, SweepReport};
use crate::db;
use crate::error::HandoffError;
use crate::models::{Message, SenderType, Session};

/// Postgres-backed store. Liveness is judged against the database clock (`now()`)
/// and every row timestamp is assigned by the database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    content: String,
    sender_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = HandoffError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let sender_type = row
            .sender_type
            .parse::<SenderType>()
            .map_err(HandoffError::Other)?;
        Ok(Message {
            id: row.id,
            session_id: row.session_id,
            content: row.content,
            sender_type,
            created_at: row.created_at,
        })
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PairingStore for PgStore {
    async fn insert_session(&self, code: &str, ttl: Duration) -> Result<Option<Session>, HandoffError> {
        let mut tx = db::begin(&self.pool).await?;

        let released = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = FALSE
            WHERE session_code = $1
              AND is_active
              AND expires_at <= now()
            "#,
        )
        .bind(code)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if released > 0 {
            tracing::debug!(code = %code, "Released expired holder of session code");
        }

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, session_code, is_active, created_at, expires_at)
            VALUES ($1, $2, TRUE, now(), now() + make_interval(secs => $3))
            ON CONFLICT (session_code) WHERE is_active DO NOTHING
            RETURNING id, session_code, is_active, created_at, expires_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(ttl.num_seconds() as f64)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn find_live_session(&self, code: &str) -> Result<Option<Session>, HandoffError> {
        let mut tx = db::begin(&self.pool).await?;

        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, session_code, is_active, created_at, expires_at
            FROM sessions
            WHERE session_code = $1
              AND is_active
              AND expires_at > now()
            "#,
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn insert_message(
        &self,
        session_id: Uuid,
        content: &str,
        sender_type: SenderType,
    ) -> Result<Option<Message>, HandoffError> {
        let mut tx = db::begin(&self.pool).await?;

        // FOR SHARE holds off a concurrent deactivation until this append commits.
        let live: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM sessions
            WHERE id = $1
              AND is_active
              AND expires_at > now()
            FOR SHARE
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        if live.is_none() {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (id, session_id, content, sender_type)
            VALUES ($1, $2, $3, $4)
            RETURNING id, session_id, content, sender_type, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(content)
        .bind(sender_type.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(Message::try_from(row)?))
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, HandoffError> {
        let mut tx = db::begin(&self.pool).await?;

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, content, sender_type, created_at
            FROM messages
            WHERE session_id = $1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn sweep(&self, purge_before: DateTime<Utc>) -> Result<SweepReport, HandoffError> {
        let mut tx = db::begin(&self.pool).await?;

        let sessions_deactivated = sqlx::query(
            "UPDATE sessions SET is_active = FALSE WHERE is_active AND expires_at <= now()",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let messages_purged = sqlx::query(
            r#"
            DELETE FROM messages
            WHERE session_id IN (SELECT id FROM sessions WHERE expires_at <= $1)
            "#,
        )
        .bind(purge_before)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let sessions_purged = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(purge_before)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(SweepReport {
            sessions_deactivated,
            sessions_purged,
            messages_purged,
        })
    }

    async fn ping(&self) -> Result<String, HandoffError> {
        Ok(db::health_check(&self.pool).await?)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// Tests — need a live database; skipped when HANDOFF_TEST_DATABASE_URL is unset
// ============================================================================
