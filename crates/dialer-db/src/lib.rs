//! Prospect Dialer Database Layer
//!
//! This crate provides storage for the call-control engine. It includes:
//!
//! - Connection pool management and embedded migrations with sqlx
//! - PostgreSQL implementations of every repository trait
//! - Conditional updates and row locks that enforce the queue and call leg
//!   state machines in SQL
//! - An in-memory store with the same semantics for tests and local runs

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::MemoryStore;
pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use dialer_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
