//! Bridge request repository implementation

use dialer_core::{
    models::{BridgeRequest, BridgeStatus},
    traits::BridgeRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

const BRIDGE_COLUMNS: &str = r#"
    id, operator_id, correlation_token, leg_a_call_id, leg_b_call_id,
    target_number, source_number, operator_number, contact_id, status,
    consumed, failure_reason, expires_at, created_at, updated_at
"#;

/// PostgreSQL implementation of BridgeRepository
pub struct PgBridgeRepository {
    pool: PgPool,
}

impl PgBridgeRepository {
    /// Create a new bridge repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn db_error(action: &str, e: sqlx::Error) -> AppError {
        error!("Database error trying to {}: {}", action, e);
        AppError::Database(format!("Failed to {}: {}", action, e))
    }
}

#[async_trait]
impl BridgeRepository for PgBridgeRepository {
    #[instrument(skip(self, request), fields(leg_a = %request.leg_a_call_id))]
    async fn insert(&self, request: &BridgeRequest) -> AppResult<BridgeRequest> {
        let sql = format!(
            r#"
            INSERT INTO bridge_requests (
                id, operator_id, correlation_token, leg_a_call_id, leg_b_call_id,
                target_number, source_number, operator_number, contact_id, status,
                consumed, failure_reason, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            BRIDGE_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, BridgeRow>(&sql)
            .bind(request.id)
            .bind(&request.operator_id)
            .bind(&request.correlation_token)
            .bind(&request.leg_a_call_id)
            .bind(&request.leg_b_call_id)
            .bind(&request.target_number)
            .bind(&request.source_number)
            .bind(&request.operator_number)
            .bind(request.contact_id)
            .bind(request.status.as_str())
            .bind(request.consumed)
            .bind(&request.failure_reason)
            .bind(request.expires_at)
            .bind(request.created_at)
            .bind(request.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::db_error("insert bridge request", e))?;

        debug!("Bridge request {} stored", request.id);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<BridgeRequest>> {
        let sql = format!("SELECT {} FROM bridge_requests WHERE id = $1", BRIDGE_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, BridgeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("find bridge request", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_leg_a(&self, leg_a_call_id: &str) -> AppResult<Option<BridgeRequest>> {
        let sql = format!(
            "SELECT {} FROM bridge_requests WHERE leg_a_call_id = $1",
            BRIDGE_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, BridgeRow>(&sql)
            .bind(leg_a_call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("find bridge request", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn claim(
        &self,
        leg_a_call_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Option<BridgeRequest>> {
        let sql = format!(
            r#"
            UPDATE bridge_requests
            SET consumed = TRUE, updated_at = NOW()
            WHERE leg_a_call_id = $1
              AND consumed = FALSE
              AND status IN ('pending', 'expired')
              AND expires_at > $2
            RETURNING {}
            "#,
            BRIDGE_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, BridgeRow>(&sql)
            .bind(leg_a_call_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("claim bridge request", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn mark_bridged(&self, id: Uuid, leg_b_call_id: &str) -> AppResult<BridgeRequest> {
        let sql = format!(
            r#"
            UPDATE bridge_requests
            SET status = 'bridged', leg_b_call_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BRIDGE_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, BridgeRow>(&sql)
            .bind(id)
            .bind(leg_b_call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("mark bridge bridged", e))?
            .ok_or_else(|| AppError::NotFound(format!("Bridge request {}", id)))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn mark_failed(
        &self,
        id: Uuid,
        leg_b_call_id: Option<&str>,
        reason: &str,
    ) -> AppResult<BridgeRequest> {
        let sql = format!(
            r#"
            UPDATE bridge_requests
            SET status = 'failed',
                leg_b_call_id = COALESCE($2, leg_b_call_id),
                failure_reason = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BRIDGE_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, BridgeRow>(&sql)
            .bind(id)
            .bind(leg_b_call_id)
            .bind(reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("mark bridge failed", e))?
            .ok_or_else(|| AppError::NotFound(format!("Bridge request {}", id)))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn expire_for_leg(&self, leg_a_call_id: &str) -> AppResult<Option<BridgeRequest>> {
        let sql = format!(
            r#"
            UPDATE bridge_requests
            SET status = 'expired', updated_at = NOW()
            WHERE leg_a_call_id = $1 AND status = 'pending' AND consumed = FALSE
            RETURNING {}
            "#,
            BRIDGE_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, BridgeRow>(&sql)
            .bind(leg_a_call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_error("expire bridge request", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn expire_stale(&self, now: DateTime<Utc>) -> AppResult<Vec<BridgeRequest>> {
        let sql = format!(
            r#"
            UPDATE bridge_requests
            SET status = 'expired', updated_at = NOW()
            WHERE status = 'pending' AND consumed = FALSE AND expires_at <= $1
            RETURNING {}
            "#,
            BRIDGE_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, BridgeRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_error("expire stale bridge requests", e))?;

        if !rows.is_empty() {
            info!("Expired {} stale bridge requests", rows.len());
        }

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn purge_finished(&self, older_than: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM bridge_requests
            WHERE status IN ('bridged', 'expired', 'failed') AND updated_at < $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_error("purge bridge requests", e))?;

        Ok(result.rows_affected())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct BridgeRow {
    id: Uuid,
    operator_id: String,
    correlation_token: String,
    leg_a_call_id: String,
    leg_b_call_id: Option<String>,
    target_number: String,
    source_number: String,
    operator_number: String,
    contact_id: Option<i64>,
    status: String,
    consumed: bool,
    failure_reason: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BridgeRow> for BridgeRequest {
    fn from(row: BridgeRow) -> Self {
        Self {
            id: row.id,
            operator_id: row.operator_id,
            correlation_token: row.correlation_token,
            leg_a_call_id: row.leg_a_call_id,
            leg_b_call_id: row.leg_b_call_id,
            target_number: row.target_number,
            source_number: row.source_number,
            operator_number: row.operator_number,
            contact_id: row.contact_id,
            status: BridgeStatus::from_str(&row.status).unwrap_or(BridgeStatus::Expired),
            consumed: row.consumed,
            failure_reason: row.failure_reason,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
