//! Read-only lookups into the CRM contact and operator tables

use dialer_core::{
    models::{Contact, Operator},
    traits::{ContactDirectory, OperatorDirectory},
    AppError, AppResult,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, instrument};

/// PostgreSQL implementation of ContactDirectory and OperatorDirectory
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    /// Create a new directory
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactDirectory for PgDirectory {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Contact>> {
        let row = sqlx::query_as::<sqlx::Postgres, ContactRow>(
            "SELECT id, display_name, phone FROM contacts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding contact {}: {}", id, e);
            AppError::Database(format!("Failed to find contact: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<Contact>> {
        let row = sqlx::query_as::<sqlx::Postgres, ContactRow>(
            "SELECT id, display_name, phone FROM contacts WHERE phone = $1 ORDER BY id LIMIT 1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding contact by phone: {}", e);
            AppError::Database(format!("Failed to find contact: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl OperatorDirectory for PgDirectory {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Operator>> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT id, cell_phone FROM operators WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error finding operator {}: {}", id, e);
                    AppError::Database(format!("Failed to find operator: {}", e))
                })?;

        Ok(row.map(|(id, cell_phone)| Operator { id, cell_phone }))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    id: i64,
    display_name: String,
    phone: Option<String>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            display_name: row.display_name,
            phone: row.phone,
        }
    }
}
