//! Repository implementations
//!
//! This module contains concrete implementations of all repository traits
//! defined in dialer-core, using sqlx for PostgreSQL access.

pub mod bridge_repo;
pub mod call_leg_repo;
pub mod directory_repo;
pub mod ledger_repo;
pub mod queue_repo;
pub mod session_repo;
pub mod webhook_event_repo;

pub use bridge_repo::PgBridgeRepository;
pub use call_leg_repo::PgCallLegRepository;
pub use directory_repo::PgDirectory;
pub use ledger_repo::{PgBillingLedger, PgPhoneNumberInventory};
pub use queue_repo::PgQueueRepository;
pub use session_repo::PgSessionRepository;
pub use webhook_event_repo::PgWebhookEventRepository;

use dialer_core::traits::Repositories;
use sqlx::PgPool;
use std::sync::Arc;

/// Build the full set of PostgreSQL-backed repositories over one pool
pub fn pg_repositories(pool: PgPool) -> Repositories {
    let directory = Arc::new(PgDirectory::new(pool.clone()));

    Repositories {
        sessions: Arc::new(PgSessionRepository::new(pool.clone())),
        queue: Arc::new(PgQueueRepository::new(pool.clone())),
        legs: Arc::new(PgCallLegRepository::new(pool.clone())),
        bridges: Arc::new(PgBridgeRepository::new(pool.clone())),
        webhook_events: Arc::new(PgWebhookEventRepository::new(pool.clone())),
        ledger: Arc::new(PgBillingLedger::new(pool.clone())),
        inventory: Arc::new(PgPhoneNumberInventory::new(pool)),
        contacts: directory.clone(),
        operators: directory,
    }
}

/// Whether a sqlx error is a unique constraint violation
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
