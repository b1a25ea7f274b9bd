//! Click-to-call-via-cell bridge requests
//!
//! A bridge request links leg A (operator's cell) to the prospect leg B that
//! is dialed once leg A answers. The `consumed` flag is claimed exactly once;
//! whoever flips it owns the leg B origination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    /// Waiting for leg A to answer
    #[default]
    Pending,
    /// Leg B dialed and bridge command issued
    Bridged,
    /// Leg A ended or timed out before answering
    Expired,
    /// Leg B could not be originated or bridged
    Failed,
}

impl BridgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeStatus::Pending => "pending",
            BridgeStatus::Bridged => "bridged",
            BridgeStatus::Expired => "expired",
            BridgeStatus::Failed => "failed",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BridgeStatus::Pending),
            "bridged" => Some(BridgeStatus::Bridged),
            "expired" => Some(BridgeStatus::Expired),
            "failed" => Some(BridgeStatus::Failed),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, BridgeStatus::Pending)
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bridge request entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: Uuid,
    pub operator_id: String,

    /// Encoded correlation token handed to the provider as client state
    pub correlation_token: String,

    /// Provider id of the operator's cell leg
    pub leg_a_call_id: String,

    /// Provider id of the prospect leg, once dialed
    pub leg_b_call_id: Option<String>,

    /// Prospect number
    pub target_number: String,

    /// Caller id presented to the prospect
    pub source_number: String,

    /// Operator cell number dialed for leg A
    pub operator_number: String,

    pub contact_id: Option<i64>,
    pub status: BridgeStatus,
    pub consumed: bool,
    pub failure_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BridgeRequest {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether an answer of leg A at `at` can still claim leg B origination
    ///
    /// The timeout sweep may mark a request expired before an answer that
    /// happened inside the window is processed, so an unconsumed `Expired`
    /// request stays claimable for answers that precede the deadline.
    pub fn is_claimable_at(&self, at: DateTime<Utc>) -> bool {
        !self.consumed
            && matches!(self.status, BridgeStatus::Pending | BridgeStatus::Expired)
            && !self.is_expired_at(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(expires_in: i64) -> BridgeRequest {
        let now = Utc::now();
        BridgeRequest {
            id: Uuid::new_v4(),
            operator_id: "agent-1".to_string(),
            correlation_token: "tok".to_string(),
            leg_a_call_id: "v3:a".to_string(),
            leg_b_call_id: None,
            target_number: "+15553334444".to_string(),
            source_number: "+15555556666".to_string(),
            operator_number: "+15551112222".to_string(),
            contact_id: None,
            status: BridgeStatus::Pending,
            consumed: false,
            failure_reason: None,
            expires_at: now + Duration::seconds(expires_in),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_claimable() {
        let now = Utc::now();
        assert!(request(30).is_claimable_at(now));
        assert!(!request(-1).is_claimable_at(now));

        let mut consumed = request(30);
        consumed.consumed = true;
        assert!(!consumed.is_claimable_at(now));

        let mut failed = request(30);
        failed.status = BridgeStatus::Failed;
        assert!(!failed.is_claimable_at(now));
    }

    #[test]
    fn test_swept_request_claimable_for_answer_inside_window() {
        let mut swept = request(30);
        swept.status = BridgeStatus::Expired;

        assert!(swept.is_claimable_at(swept.created_at + Duration::seconds(10)));
        assert!(!swept.is_claimable_at(swept.expires_at));
    }
}
