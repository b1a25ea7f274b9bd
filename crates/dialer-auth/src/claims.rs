//! Operator token claims
//!
//! The subject of every token is the operator id; it is the implicit operator
//! identity behind session and bridge requests.

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Operator id
    pub sub: String,

    /// Display name, when the CRM includes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub iat: i64,

    /// Zero until signed
    pub exp: i64,
}

impl Claims {
    /// Unsigned claims for an operator; `JwtService` sets the expiry
    ///
    /// ```
    /// use dialer_auth::Claims;
    ///
    /// let claims = Claims::new("agent-7");
    /// assert_eq!(claims.operator_id(), "agent-7");
    /// ```
    pub fn new(operator_id: &str) -> Self {
        Self {
            sub: operator_id.to_string(),
            name: None,
            iat: Utc::now().timestamp(),
            exp: 0,
        }
    }

    pub fn operator_id(&self) -> &str {
        &self.sub
    }

    /// Name to show in logs and the UI, falling back to the operator id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crm_claims_deserialize() {
        let claims: Claims = serde_json::from_str(
            r#"{"sub":"agent-3","name":"Dana","iat":1714550000,"exp":1714553600}"#,
        )
        .unwrap();
        assert_eq!(claims.operator_id(), "agent-3");
        assert_eq!(claims.display_name(), "Dana");

        let anonymous = Claims::new("agent-4");
        assert_eq!(anonymous.display_name(), "agent-4");
        assert_eq!(anonymous.exp, 0);
    }
}
