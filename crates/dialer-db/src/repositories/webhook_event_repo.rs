//! Webhook inbox repository implementation
//!
//! Normalized events are stored as JSONB keyed by the provider event id, so a
//! redelivered webhook is recorded once.

use dialer_core::{models::CallEvent, traits::WebhookEventRepository, AppError, AppResult};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};

/// PostgreSQL implementation of WebhookEventRepository
pub struct PgWebhookEventRepository {
    pool: PgPool,
}

impl PgWebhookEventRepository {
    /// Create a new webhook event repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventRepository for PgWebhookEventRepository {
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    async fn record(&self, event: &CallEvent) -> AppResult<bool> {
        let payload = serde_json::to_value(event)?;

        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, call_control_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.call_control_id)
        .bind(event.kind.name())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording webhook event: {}", e);
            AppError::Database(format!("Failed to record webhook event: {}", e))
        })?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!("Webhook event {} already recorded", event.event_id);
        }
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn mark_processed(&self, event_id: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE webhook_events SET processed_at = NOW() WHERE event_id = $1 AND processed_at IS NULL",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error marking event {} processed: {}", event_id, e);
            AppError::Database(format!("Failed to mark webhook event processed: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_unprocessed(&self, limit: i64) -> AppResult<Vec<CallEvent>> {
        let rows: Vec<(String, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT event_id, payload
            FROM webhook_events
            WHERE processed_at IS NULL
            ORDER BY seq
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error loading unprocessed events: {}", e);
            AppError::Database(format!("Failed to load webhook events: {}", e))
        })?;

        let events = rows
            .into_iter()
            .filter_map(|(event_id, payload)| match serde_json::from_value(payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Skipping undecodable stored event {}: {}", event_id, e);
                    None
                }
            })
            .collect();

        Ok(events)
    }
}
