//! Actix-web request extractor for the authenticated operator

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use dialer_core::error::AppError;
use futures::future::{ready, Ready};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extract JWT token from request
///
/// Checks for token in the following order:
/// 1. Authorization header (Bearer token)
/// 2. Cookie named "token"
fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(auth_header) = req.headers().get("Authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    req.cookie("token").map(|cookie| cookie.value().to_string())
}

/// Authenticated operator extractor
///
/// # Examples
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use dialer_auth::AuthenticatedOperator;
///
/// async fn handler(operator: AuthenticatedOperator) -> HttpResponse {
///     HttpResponse::Ok().body(operator.operator_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedOperator {
    pub operator_id: String,

    /// Full claims from the JWT token
    pub claims: Claims,
}

impl AuthenticatedOperator {
    /// Fail with `Forbidden` unless this operator is `owner_id`
    pub fn ensure_owns(&self, owner_id: &str) -> Result<(), AppError> {
        if self.operator_id == owner_id {
            Ok(())
        } else {
            warn!(
                operator = %self.operator_id,
                owner = %owner_id,
                "Operator attempted to act on another operator's resource"
            );
            Err(AppError::Forbidden(
                "Resource belongs to another operator".to_string(),
            ))
        }
    }
}

impl FromRequest for AuthenticatedOperator {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let jwt_service = match req.app_data::<web::Data<Arc<JwtService>>>() {
            Some(service) => service.get_ref().clone(),
            None => {
                warn!("JwtService not found in app data");
                return ready(Err(AppError::Unauthorized(
                    "Authentication service not configured".to_string(),
                )));
            }
        };

        let token = match extract_token_from_request(req) {
            Some(t) => t,
            None => {
                debug!("No authentication token found in request");
                return ready(Err(AppError::Unauthorized(
                    "No authentication token provided".to_string(),
                )));
            }
        };

        match jwt_service.validate_token(&token) {
            Ok(claims) => {
                debug!(operator = %claims.sub, name = %claims.display_name(), "Operator authenticated");
                ready(Ok(AuthenticatedOperator {
                    operator_id: claims.sub.clone(),
                    claims,
                }))
            }
            Err(e) => {
                warn!(error = %e, "Token validation failed");
                ready(Err(e))
            }
        }
    }
}
