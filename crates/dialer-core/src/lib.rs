//! Prospect Dialer Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the call-control engine. It includes:
//!
//! - Domain models (DialSession, QueueItem, CallLeg, BridgeRequest, CallEvent)
//! - The call leg and queue item state machines
//! - Phone number parsing and the bridge correlation token
//! - Repository and collaborator traits consumed by the services crate
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod correlation;
pub mod error;
pub mod models;
pub mod phone;
pub mod traits;

pub use config::AppConfig;
pub use correlation::CorrelationToken;
pub use error::AppError;
pub use phone::PhoneNumber;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
