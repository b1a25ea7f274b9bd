//! Operator authentication for the prospect dialer
//!
//! This crate provides JWT-based authentication and the Actix-web extractor
//! that supplies the operator identity behind every session and bridge
//! request.
//!
//! # Examples
//!
//! ```no_run
//! use dialer_auth::JwtService;
//!
//! let jwt_service = JwtService::new("your-secret-key", 3600);
//! let token = jwt_service.create_token_for_operator("agent-7")?;
//! let claims = jwt_service.validate_token(&token)?;
//! assert_eq!(claims.operator_id(), "agent-7");
//! # Ok::<(), dialer_core::error::AppError>(())
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::AuthenticatedOperator;
