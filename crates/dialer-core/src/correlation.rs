//! Bridge correlation token
//!
//! The token rides along with the agent-cell leg as provider client state and
//! comes back verbatim on every webhook for that leg. It is a versioned JSON
//! record, base64 encoded, so that malformed or foreign state can be rejected
//! instead of trusted.

use crate::error::AppError;
use crate::phone::PhoneNumber;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Current token format version
pub const TOKEN_VERSION: u8 = 1;

/// Decoded bridge correlation token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationToken {
    /// Format version
    pub v: u8,

    /// Operator who requested the bridge
    pub operator_id: String,

    /// Prospect number dialed once the operator answers
    pub prospect_number: PhoneNumber,

    /// Caller id presented on both legs
    pub caller_id_number: PhoneNumber,

    /// CRM contact being called
    pub contact_id: Option<i64>,
}

impl CorrelationToken {
    pub fn new(
        operator_id: impl Into<String>,
        prospect_number: PhoneNumber,
        caller_id_number: PhoneNumber,
        contact_id: Option<i64>,
    ) -> Self {
        Self {
            v: TOKEN_VERSION,
            operator_id: operator_id.into(),
            prospect_number,
            caller_id_number,
            contact_id,
        }
    }

    /// Encode into the opaque client-state string handed to the provider
    pub fn encode(&self) -> Result<String, AppError> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode and validate client state received on a webhook
    pub fn decode(raw: &str) -> Result<Self, AppError> {
        let bytes = STANDARD
            .decode(raw.trim())
            .map_err(|e| AppError::InvalidCorrelationToken(format!("not base64: {}", e)))?;

        let token: CorrelationToken = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::InvalidCorrelationToken(format!("malformed payload: {}", e)))?;

        if token.v != TOKEN_VERSION {
            return Err(AppError::InvalidCorrelationToken(format!(
                "unsupported version {}",
                token.v
            )));
        }

        if token.operator_id.trim().is_empty() {
            return Err(AppError::InvalidCorrelationToken(
                "missing operator id".to_string(),
            ));
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CorrelationToken {
        CorrelationToken::new(
            "agent-7",
            PhoneNumber::parse("+15553334444").unwrap(),
            PhoneNumber::parse("+15555556666").unwrap(),
            Some(42),
        )
    }

    #[test]
    fn test_encoded_token_is_opaque_and_decodes() {
        let encoded = token().encode().unwrap();
        assert!(!encoded.contains("agent-7"));
        assert_eq!(CorrelationToken::decode(&encoded).unwrap(), token());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            CorrelationToken::decode("%%%"),
            Err(AppError::InvalidCorrelationToken(_))
        ));
        let not_json = STANDARD.encode(b"hello");
        assert!(CorrelationToken::decode(&not_json).is_err());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut t = token();
        t.v = 9;
        let encoded = STANDARD.encode(serde_json::to_vec(&t).unwrap());
        assert!(matches!(
            CorrelationToken::decode(&encoded),
            Err(AppError::InvalidCorrelationToken(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_embedded_number() {
        let raw = serde_json::json!({
            "v": 1,
            "operator_id": "agent-7",
            "prospect_number": "abc",
            "caller_id_number": "+15555556666",
            "contact_id": null
        });
        let encoded = STANDARD.encode(raw.to_string());
        assert!(CorrelationToken::decode(&encoded).is_err());
    }
}
