//! Queue item repository implementation
//!
//! Dequeue runs inside a transaction that locks the session row, so
//! concurrent dequeues for one session are serialized. The partial unique
//! index on DIALING items backs the same rule at the schema level.

use super::is_unique_violation;
use dialer_core::{
    models::{Disposition, EnqueueResult, QueueItem, QueueItemStatus, QueueOutcome},
    traits::QueueRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

const ITEM_COLUMNS: &str = r#"
    id, session_id, contact_id, priority, status, attempts, last_attempt_at,
    was_contacted, was_answered, disposition, seq, added_at, completed_at
"#;

/// PostgreSQL implementation of QueueRepository
pub struct PgQueueRepository {
    pool: PgPool,
}

impl PgQueueRepository {
    /// Create a new queue repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueRepository for PgQueueRepository {
    #[instrument(skip(self, contact_ids), fields(count = contact_ids.len()))]
    async fn insert_items(
        &self,
        session_id: Uuid,
        contact_ids: &[i64],
        priority: Option<i32>,
    ) -> AppResult<EnqueueResult> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Serialize writers of this session's queue
        sqlx::query("SELECT id FROM dial_sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to lock session {}: {}", session_id, e);
                AppError::Database(format!("Failed to lock session: {}", e))
            })?
            .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))?;

        let priority = match priority {
            Some(p) => p,
            None => {
                let (max,): (Option<i32>,) =
                    sqlx::query_as("SELECT MAX(priority) FROM queue_items WHERE session_id = $1")
                        .bind(session_id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| {
                            error!("Failed to read max priority: {}", e);
                            AppError::Database(format!("Failed to read max priority: {}", e))
                        })?;
                max.map_or(0, |m| m.saturating_add(1))
            }
        };

        let sql = format!(
            r#"
            INSERT INTO queue_items (id, session_id, contact_id, priority)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id, contact_id) DO NOTHING
            RETURNING {}
            "#,
            ITEM_COLUMNS
        );

        let mut result = EnqueueResult::default();
        for &contact_id in contact_ids {
            let row = sqlx::query_as::<sqlx::Postgres, QueueItemRow>(&sql)
                .bind(Uuid::new_v4())
                .bind(session_id)
                .bind(contact_id)
                .bind(priority)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Failed to insert queue item: {}", e);
                    AppError::Database(format!("Failed to insert queue item: {}", e))
                })?;

            match row {
                Some(row) => result.added.push(row.into()),
                None => result.rejected.push(contact_id),
            }
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            "Enqueued {} items into session {} ({} rejected)",
            result.added.len(),
            session_id,
            result.rejected.len()
        );

        Ok(result)
    }

    #[instrument(skip(self))]
    async fn dequeue_next(&self, session_id: Uuid) -> AppResult<QueueItem> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        sqlx::query("SELECT id FROM dial_sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to lock session {}: {}", session_id, e);
                AppError::Database(format!("Failed to lock session: {}", e))
            })?
            .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))?;

        let (dialing,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM queue_items WHERE session_id = $1 AND status = 'dialing')",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to check dialing items: {}", e);
            AppError::Database(format!("Failed to check dialing items: {}", e))
        })?;

        if dialing {
            return Err(AppError::DialInProgress(session_id.to_string()));
        }

        let sql = format!(
            r#"
            UPDATE queue_items
            SET status = 'dialing',
                attempts = attempts + 1,
                last_attempt_at = NOW()
            WHERE id = (
                SELECT id FROM queue_items
                WHERE session_id = $1 AND status = 'pending'
                ORDER BY priority DESC, added_at ASC, seq ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            ITEM_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, QueueItemRow>(&sql)
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::DialInProgress(session_id.to_string())
                } else {
                    error!("Failed to dequeue item: {}", e);
                    AppError::Database(format!("Failed to dequeue item: {}", e))
                }
            })?
            .ok_or_else(|| AppError::EmptyQueue(session_id.to_string()))?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        let item: QueueItem = row.into();
        info!(
            "Dequeued item {} (contact {}) for session {}",
            item.id, item.contact_id, session_id
        );

        Ok(item)
    }

    #[instrument(skip(self, outcome))]
    async fn transition(
        &self,
        item_id: Uuid,
        to: QueueItemStatus,
        outcome: Option<QueueOutcome>,
    ) -> AppResult<QueueItem> {
        let from: Vec<String> = QueueItemStatus::allowed_predecessors(to)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let sql = format!(
            r#"
            UPDATE queue_items
            SET status = $2,
                completed_at = CASE WHEN $3 THEN NOW() ELSE NULL END,
                disposition = COALESCE($4, disposition),
                was_answered = COALESCE($5, was_answered),
                was_contacted = COALESCE($6, was_contacted)
            WHERE id = $1 AND status = ANY($7)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, QueueItemRow>(&sql)
            .bind(item_id)
            .bind(to.as_str())
            .bind(to.is_finished())
            .bind(outcome.as_ref().map(|o| o.disposition.as_str()))
            .bind(outcome.as_ref().map(|o| o.was_answered))
            .bind(outcome.as_ref().map(|o| o.was_contacted()))
            .bind(&from)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::DialInProgress(format!("item {}", item_id))
                } else {
                    error!("Database error transitioning item {}: {}", item_id, e);
                    AppError::Database(format!("Failed to update queue item: {}", e))
                }
            })?;

        match row {
            Some(row) => Ok(row.into()),
            None => match self.find_by_id(item_id).await? {
                Some(item) => Err(AppError::InvalidItemState(format!(
                    "item {} cannot move from {} to {}",
                    item_id, item.status, to
                ))),
                None => Err(AppError::NotFound(format!("Queue item {}", item_id))),
            },
        }
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, item_id: Uuid) -> AppResult<Option<QueueItem>> {
        let sql = format!("SELECT {} FROM queue_items WHERE id = $1", ITEM_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, QueueItemRow>(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding queue item {}: {}", item_id, e);
                AppError::Database(format!("Failed to find queue item: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list(&self, session_id: Uuid) -> AppResult<Vec<QueueItem>> {
        let sql = format!(
            r#"
            SELECT {} FROM queue_items
            WHERE session_id = $1
            ORDER BY priority DESC, added_at ASC, seq ASC
            "#,
            ITEM_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, QueueItemRow>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing queue {}: {}", session_id, e);
                AppError::Database(format!("Failed to list queue: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, contact_ids))]
    async fn remove(&self, session_id: Uuid, contact_ids: &[i64]) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM queue_items
            WHERE session_id = $1
              AND contact_id = ANY($2)
              AND status IN ('pending', 'skipped')
            "#,
        )
        .bind(session_id)
        .bind(contact_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error removing queue items: {}", e);
            AppError::Database(format!("Failed to remove queue items: {}", e))
        })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn update_priority(&self, item_id: Uuid, priority: i32) -> AppResult<QueueItem> {
        let sql = format!(
            "UPDATE queue_items SET priority = $2 WHERE id = $1 RETURNING {}",
            ITEM_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, QueueItemRow>(&sql)
            .bind(item_id)
            .bind(priority)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating priority of {}: {}", item_id, e);
                AppError::Database(format!("Failed to update priority: {}", e))
            })?
            .ok_or_else(|| AppError::NotFound(format!("Queue item {}", item_id)))?;

        Ok(row.into())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct QueueItemRow {
    id: Uuid,
    session_id: Uuid,
    contact_id: i64,
    priority: i32,
    status: String,
    attempts: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    was_contacted: bool,
    was_answered: bool,
    disposition: Option<String>,
    seq: i64,
    added_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<QueueItemRow> for QueueItem {
    fn from(row: QueueItemRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            contact_id: row.contact_id,
            priority: row.priority,
            status: QueueItemStatus::from_str(&row.status).unwrap_or(QueueItemStatus::Failed),
            attempts: row.attempts,
            last_attempt_at: row.last_attempt_at,
            was_contacted: row.was_contacted,
            was_answered: row.was_answered,
            disposition: row.disposition.as_deref().and_then(Disposition::from_str),
            seq: row.seq,
            added_at: row.added_at,
            completed_at: row.completed_at,
        }
    }
}
