//! Unified error handling for the dialer
//!
//! This module provides one error type covering validation, queue/session
//! preconditions, provider failures and infrastructure failures, with
//! automatic HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Authentication Errors ====================
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ==================== Dialing Errors ====================
    #[error("Invalid phone number: {0}")]
    InvalidNumber(String),

    #[error("Bridge origination failed: {0}")]
    BridgeOriginationFailed(String),

    #[error("Queue is empty for session {0}")]
    EmptyQueue(String),

    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("Session already active for operator {0}")]
    SessionAlreadyActive(String),

    #[error("A call is already being dialed in session {0}")]
    DialInProgress(String),

    #[error("Invalid queue item state: {0}")]
    InvalidItemState(String),

    #[error("Unknown call leg: {0}")]
    UnknownLeg(String),

    #[error("Invalid call leg state: {0}")]
    InvalidLegState(String),

    #[error("Invalid correlation token: {0}")]
    InvalidCorrelationToken(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ==================== External Service Errors ====================
    #[error("Telephony provider error: {0}")]
    Provider(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_)
            | AppError::InvalidInput(_)
            | AppError::InvalidNumber(_)
            | AppError::InvalidCorrelationToken(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::InvalidToken(_) | AppError::TokenExpired | AppError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }

            // 403 Forbidden
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound(_) | AppError::UnknownLeg(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_)
            | AppError::EmptyQueue(_)
            | AppError::InvalidSessionState(_)
            | AppError::SessionAlreadyActive(_)
            | AppError::DialInProgress(_)
            | AppError::InvalidItemState(_)
            | AppError::InvalidLegState(_) => StatusCode::CONFLICT,

            // 502 Bad Gateway
            AppError::BridgeOriginationFailed(_) | AppError::Provider(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::TokenExpired => "token_expired",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::InvalidNumber(_) => "invalid_number",
            AppError::BridgeOriginationFailed(_) => "bridge_origination_failed",
            AppError::EmptyQueue(_) => "empty_queue",
            AppError::InvalidSessionState(_) => "invalid_session_state",
            AppError::SessionAlreadyActive(_) => "session_already_active",
            AppError::DialInProgress(_) => "dial_in_progress",
            AppError::InvalidItemState(_) => "invalid_item_state",
            AppError::UnknownLeg(_) => "unknown_leg",
            AppError::InvalidLegState(_) => "invalid_leg_state",
            AppError::InvalidCorrelationToken(_) => "invalid_correlation_token",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Provider(_) => "provider_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::InvalidNumber("abc".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::EmptyQueue("s1".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::InvalidSessionState("paused".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::BridgeOriginationFailed("rejected".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Database("down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::InvalidNumber("abc".to_string()).error_code(),
            "invalid_number"
        );
        assert_eq!(
            AppError::DialInProgress("s1".to_string()).error_code(),
            "dial_in_progress"
        );
        assert_eq!(AppError::TokenExpired.error_code(), "token_expired");
    }
}
