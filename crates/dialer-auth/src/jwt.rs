//! Operator token signing and verification
//!
//! Tokens are HS256 JWTs whose subject is the operator id. The CRM front end
//! mints them with the same secret; the dialer only needs to verify them,
//! but can issue its own for tooling and tests.

use crate::claims::Claims;
use chrono::{Duration, Utc};
use dialer_core::error::AppError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, warn};

/// Clock skew tolerated between the CRM and the dialer
const LEEWAY_SECS: u64 = 30;

#[derive(Clone)]
pub struct JwtService {
    ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    /// `expiration_secs` is the lifetime of tokens issued by [`JwtService::create_token`]
    pub fn new(secret: &str, expiration_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            ttl: Duration::seconds(expiration_secs),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign claims, stamping the expiry when the caller left it unset
    pub fn create_token(&self, claims: &Claims) -> Result<String, AppError> {
        let mut claims = claims.clone();
        if claims.exp == 0 {
            claims.exp = (Utc::now() + self.ttl).timestamp();
        }

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("signing operator token: {}", e)))
    }

    pub fn create_token_for_operator(&self, operator_id: &str) -> Result<String, AppError> {
        self.create_token(&Claims::new(operator_id))
    }

    /// Verify signature and expiry and return the operator claims
    ///
    /// # Errors
    ///
    /// `TokenExpired` past the expiry plus leeway, `InvalidToken` for
    /// anything else including a blank subject.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => {
                    warn!("Rejected operator token: {}", e);
                    AppError::InvalidToken(e.to_string())
                }
            })?;

        if claims.operator_id().trim().is_empty() {
            return Err(AppError::InvalidToken("token has no operator".to_string()));
        }

        debug!(operator = %claims.operator_id(), "Operator token verified");
        Ok(claims)
    }

    pub fn expiration_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}
