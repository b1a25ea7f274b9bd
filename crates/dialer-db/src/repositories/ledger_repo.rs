//! Billing ledger and phone number usage counters

use dialer_core::{
    models::LedgerEntry,
    traits::{BillingLedger, PhoneNumberInventory},
    AppError, AppResult,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of BillingLedger
pub struct PgBillingLedger {
    pool: PgPool,
}

impl PgBillingLedger {
    /// Create a new billing ledger writer
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingLedger for PgBillingLedger {
    #[instrument(skip(self, entry), fields(call_id = %entry.provider_call_id, cost = %entry.cost))]
    async fn append(&self, entry: &LedgerEntry) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_ledger (provider_call_id, call_leg_id, phone_number, cost, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (provider_call_id) DO NOTHING
            "#,
        )
        .bind(&entry.provider_call_id)
        .bind(entry.call_leg_id)
        .bind(&entry.phone_number)
        .bind(entry.cost)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error appending ledger entry: {}", e);
            AppError::Database(format!("Failed to append ledger entry: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

/// PostgreSQL implementation of PhoneNumberInventory
pub struct PgPhoneNumberInventory {
    pool: PgPool,
}

impl PgPhoneNumberInventory {
    /// Create a new inventory writer
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhoneNumberInventory for PgPhoneNumberInventory {
    #[instrument(skip(self))]
    async fn record_usage(&self, number: &str, cost: Option<Decimal>) -> AppResult<()> {
        debug!("Recording usage of {}", number);

        sqlx::query(
            r#"
            INSERT INTO phone_numbers (number, call_count, total_cost, last_used_at)
            VALUES ($1, 1, $2, NOW())
            ON CONFLICT (number) DO UPDATE
            SET call_count = phone_numbers.call_count + 1,
                total_cost = phone_numbers.total_cost + EXCLUDED.total_cost,
                last_used_at = NOW()
            "#,
        )
        .bind(number)
        .bind(cost.unwrap_or(Decimal::ZERO))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording usage of {}: {}", number, e);
            AppError::Database(format!("Failed to record number usage: {}", e))
        })?;

        Ok(())
    }
}
