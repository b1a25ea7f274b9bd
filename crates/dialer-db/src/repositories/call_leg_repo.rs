//! Call leg repository implementation
//!
//! Status updates are conditional on the predecessor statuses of the target,
//! so a stale or duplicate webhook matches zero rows instead of regressing
//! the leg.

use super::is_unique_violation;
use dialer_core::{
    models::{
        CallDirection, CallLeg, CallLegStatus, Disposition, LegMetadata, StatusChange,
    },
    traits::CallLegRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const LEG_COLUMNS: &str = r#"
    id, provider_call_id, session_id, queue_item_id, contact_id, contact_name,
    operator_id, from_number, to_number, direction, status, answered_at,
    ended_at, duration_secs, hangup_cause, recording_url, machine_detection,
    cost, disposition, notes, created_at, updated_at
"#;

/// PostgreSQL implementation of CallLegRepository
pub struct PgCallLegRepository {
    pool: PgPool,
}

impl PgCallLegRepository {
    /// Create a new call leg repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, column: &str, value: LegKey<'_>) -> AppResult<Option<CallLeg>> {
        let sql = format!(
            "SELECT {} FROM call_legs WHERE {} = $1 ORDER BY created_at DESC LIMIT 1",
            LEG_COLUMNS, column
        );
        let query = sqlx::query_as::<sqlx::Postgres, CallLegRow>(&sql);
        let query = match value {
            LegKey::Uuid(id) => query.bind(id),
            LegKey::Text(s) => query.bind(s.to_string()),
        };

        let row = query.fetch_optional(&self.pool).await.map_err(|e| {
            error!("Database error finding call leg by {}: {}", column, e);
            AppError::Database(format!("Failed to find call leg: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

enum LegKey<'a> {
    Uuid(Uuid),
    Text(&'a str),
}

#[async_trait]
impl CallLegRepository for PgCallLegRepository {
    #[instrument(skip(self, leg), fields(call_id = %leg.provider_call_id))]
    async fn insert(&self, leg: &CallLeg) -> AppResult<CallLeg> {
        debug!("Recording call leg {}", leg.id);

        let sql = format!(
            r#"
            INSERT INTO call_legs (
                id, provider_call_id, session_id, queue_item_id, contact_id,
                contact_name, operator_id, from_number, to_number, direction,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            LEG_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallLegRow>(&sql)
            .bind(leg.id)
            .bind(&leg.provider_call_id)
            .bind(leg.session_id)
            .bind(leg.queue_item_id)
            .bind(leg.contact_id)
            .bind(&leg.contact_name)
            .bind(&leg.operator_id)
            .bind(&leg.from_number)
            .bind(&leg.to_number)
            .bind(leg.direction.as_str())
            .bind(leg.status.as_str())
            .bind(leg.created_at)
            .bind(leg.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(format!(
                        "Call leg {} already exists",
                        leg.provider_call_id
                    ))
                } else {
                    error!("Database error inserting call leg: {}", e);
                    AppError::Database(format!("Failed to insert call leg: {}", e))
                }
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallLeg>> {
        self.fetch_one_by("id", LegKey::Uuid(id)).await
    }

    #[instrument(skip(self))]
    async fn find_by_provider_id(&self, provider_call_id: &str) -> AppResult<Option<CallLeg>> {
        self.fetch_one_by("provider_call_id", LegKey::Text(provider_call_id))
            .await
    }

    #[instrument(skip(self))]
    async fn find_by_queue_item(&self, item_id: Uuid) -> AppResult<Option<CallLeg>> {
        self.fetch_one_by("queue_item_id", LegKey::Uuid(item_id)).await
    }

    #[instrument(skip(self))]
    async fn list_for_session(&self, session_id: Uuid) -> AppResult<Vec<CallLeg>> {
        let sql = format!(
            "SELECT {} FROM call_legs WHERE session_id = $1 ORDER BY created_at",
            LEG_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallLegRow>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing legs of session {}: {}", session_id, e);
                AppError::Database(format!("Failed to list call legs: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, change), fields(to = %change.to))]
    async fn advance(
        &self,
        provider_call_id: &str,
        change: &StatusChange,
    ) -> AppResult<Option<CallLeg>> {
        let from: Vec<String> = CallLegStatus::predecessors(change.to)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let hangup = change.hangup.as_ref();

        let sql = format!(
            r#"
            UPDATE call_legs
            SET status = $2,
                answered_at = CASE WHEN $3 AND answered_at IS NULL THEN $4 ELSE answered_at END,
                ended_at = CASE WHEN $5 THEN $4 ELSE ended_at END,
                duration_secs = CASE WHEN $5 THEN $6 ELSE duration_secs END,
                hangup_cause = COALESCE($7, hangup_cause),
                cost = COALESCE($8, cost),
                updated_at = NOW()
            WHERE provider_call_id = $1 AND status = ANY($9)
            RETURNING {}
            "#,
            LEG_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallLegRow>(&sql)
            .bind(provider_call_id)
            .bind(change.to.as_str())
            .bind(change.to.implies_answered())
            .bind(change.at)
            .bind(hangup.is_some())
            .bind(hangup.map(|h| h.duration_secs))
            .bind(hangup.and_then(|h| h.cause.clone()))
            .bind(hangup.and_then(|h| h.cost))
            .bind(&from)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error advancing call leg {}: {}", provider_call_id, e);
                AppError::Database(format!("Failed to update call leg: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn attach_metadata(
        &self,
        provider_call_id: &str,
        metadata: &LegMetadata,
    ) -> AppResult<Option<CallLeg>> {
        let column = match metadata {
            LegMetadata::Recording(_) => "recording_url",
            LegMetadata::MachineDetection(_) => "machine_detection",
        };
        let value = match metadata {
            LegMetadata::Recording(v) | LegMetadata::MachineDetection(v) => v,
        };

        let sql = format!(
            r#"
            UPDATE call_legs
            SET {} = $2, updated_at = NOW()
            WHERE provider_call_id = $1
            RETURNING {}
            "#,
            column, LEG_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallLegRow>(&sql)
            .bind(provider_call_id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error attaching metadata to {}: {}", provider_call_id, e);
                AppError::Database(format!("Failed to update call leg: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, notes))]
    async fn set_disposition(
        &self,
        id: Uuid,
        disposition: Disposition,
        notes: Option<&str>,
    ) -> AppResult<CallLeg> {
        let sql = format!(
            r#"
            UPDATE call_legs
            SET disposition = $2,
                notes = COALESCE($3, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            LEG_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallLegRow>(&sql)
            .bind(id)
            .bind(disposition.as_str())
            .bind(notes)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error setting disposition on {}: {}", id, e);
                AppError::Database(format!("Failed to set disposition: {}", e))
            })?
            .ok_or_else(|| AppError::NotFound(format!("Call leg {}", id)))?;

        Ok(row.into())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallLegRow {
    id: Uuid,
    provider_call_id: String,
    session_id: Option<Uuid>,
    queue_item_id: Option<Uuid>,
    contact_id: Option<i64>,
    contact_name: Option<String>,
    operator_id: Option<String>,
    from_number: String,
    to_number: String,
    direction: String,
    status: String,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_secs: Option<i32>,
    hangup_cause: Option<String>,
    recording_url: Option<String>,
    machine_detection: Option<String>,
    cost: Option<Decimal>,
    disposition: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CallLegRow> for CallLeg {
    fn from(row: CallLegRow) -> Self {
        Self {
            id: row.id,
            provider_call_id: row.provider_call_id,
            session_id: row.session_id,
            queue_item_id: row.queue_item_id,
            contact_id: row.contact_id,
            contact_name: row.contact_name,
            operator_id: row.operator_id,
            from_number: row.from_number,
            to_number: row.to_number,
            direction: CallDirection::from_str(&row.direction).unwrap_or_default(),
            status: CallLegStatus::from_str(&row.status).unwrap_or(CallLegStatus::Hangup),
            answered_at: row.answered_at,
            ended_at: row.ended_at,
            duration_secs: row.duration_secs,
            hangup_cause: row.hangup_cause,
            recording_url: row.recording_url,
            machine_detection: row.machine_detection,
            cost: row.cost,
            disposition: row.disposition.as_deref().and_then(Disposition::from_str),
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
