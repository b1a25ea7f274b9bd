//! Dial session repository implementation
//!
//! The cursor and the currently dialing item are derived from `queue_items`
//! on every read rather than stored, so they can never drift from the queue.

use super::is_unique_violation;
use dialer_core::{
    models::{DialSession, SessionStatus},
    traits::SessionRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const SESSION_COLUMNS: &str = r#"
    s.id, s.owner_id, s.status, s.caller_id_number,
    s.created_at, s.updated_at, s.ended_at,
    (SELECT COUNT(*) FROM queue_items q
        WHERE q.session_id = s.id
          AND q.status IN ('completed', 'failed', 'skipped')) AS cursor,
    (SELECT q.id FROM queue_items q
        WHERE q.session_id = s.id AND q.status = 'dialing'
        LIMIT 1) AS current_item_id
"#;

/// PostgreSQL implementation of SessionRepository
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, condition: &str, bind: SessionKey<'_>) -> AppResult<Option<DialSession>> {
        let sql = format!(
            "SELECT {} FROM dial_sessions s WHERE {}",
            SESSION_COLUMNS, condition
        );
        let query = sqlx::query_as::<sqlx::Postgres, SessionRow>(&sql);
        let query = match bind {
            SessionKey::Id(id) => query.bind(id),
            SessionKey::Owner(owner) => query.bind(owner.to_string()),
        };

        let row = query.fetch_optional(&self.pool).await.map_err(|e| {
            error!("Database error finding session: {}", e);
            AppError::Database(format!("Failed to find session: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

enum SessionKey<'a> {
    Id(Uuid),
    Owner(&'a str),
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    #[instrument(skip(self, session), fields(owner = %session.owner_id))]
    async fn create(&self, session: &DialSession) -> AppResult<DialSession> {
        debug!("Creating dial session {}", session.id);

        sqlx::query(
            r#"
            INSERT INTO dial_sessions (
                id, owner_id, status, caller_id_number, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.id)
        .bind(&session.owner_id)
        .bind(session.status.to_string())
        .bind(&session.caller_id_number)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::SessionAlreadyActive(session.owner_id.clone())
            } else {
                error!("Database error creating session: {}", e);
                AppError::Database(format!("Failed to create session: {}", e))
            }
        })?;

        self.find_by_id(session.id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Session {} vanished after insert", session.id)))
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<DialSession>> {
        self.fetch_where("s.id = $1", SessionKey::Id(id)).await
    }

    #[instrument(skip(self))]
    async fn find_open_for_owner(&self, owner_id: &str) -> AppResult<Option<DialSession>> {
        self.fetch_where(
            "s.owner_id = $1 AND s.status <> 'ended'",
            SessionKey::Owner(owner_id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> AppResult<Option<DialSession>> {
        let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE dial_sessions
            SET status = $3,
                updated_at = NOW(),
                ended_at = CASE WHEN $3 = 'ended' THEN NOW() ELSE ended_at END
            WHERE id = $1 AND status = ANY($2)
            "#,
        )
        .bind(id)
        .bind(&from)
        .bind(to.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating session {}: {}", id, e);
            AppError::Database(format!("Failed to update session: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    owner_id: String,
    status: String,
    caller_id_number: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    cursor: i64,
    current_item_id: Option<Uuid>,
}

impl From<SessionRow> for DialSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            status: SessionStatus::from_str(&row.status).unwrap_or(SessionStatus::Ended),
            caller_id_number: row.caller_id_number,
            cursor: row.cursor,
            current_item_id: row.current_item_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            ended_at: row.ended_at,
        }
    }
}
