//! Call, bridge and disposition DTOs

use dialer_core::models::{BridgeRequest, BridgeStatus, Disposition};
use dialer_services::BridgeTrigger;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Click-to-call through the operator's cell
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTriggerRequest {
    /// Prospect number
    #[validate(length(min = 1, max = 32, message = "Lead phone is required"))]
    pub lead_phone: String,

    /// Caller id shown to the prospect
    #[validate(length(min = 1, max = 32, message = "From number is required"))]
    pub from_number: String,

    pub contact_id: Option<i64>,

    /// Overrides the operator's cell on file
    #[validate(length(min = 1, max = 32))]
    pub cell_phone: Option<String>,
}

impl BridgeTriggerRequest {
    pub fn into_trigger(self, operator_id: String) -> BridgeTrigger {
        BridgeTrigger {
            operator_id,
            cell_phone: self.cell_phone,
            lead_phone: self.lead_phone,
            from_number: self.from_number,
            contact_id: self.contact_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTriggerResponse {
    /// Provider id of leg A; the key for status polling
    pub call_control_id: String,
    pub bridge_id: Uuid,
    pub status: BridgeStatus,
}

impl From<&BridgeRequest> for BridgeTriggerResponse {
    fn from(request: &BridgeRequest) -> Self {
        Self {
            call_control_id: request.leg_a_call_id.clone(),
            bridge_id: request.id,
            status: request.status,
        }
    }
}

/// Outcome of a finished call
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DispositionRequest {
    pub outcome: Disposition,

    #[validate(length(max = 4000, message = "Notes are limited to 4000 characters"))]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_trigger_request() {
        let req: BridgeTriggerRequest = serde_json::from_str(
            r#"{"leadPhone":"+15553334444","fromNumber":"+15555556666","contactId":42}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert!(req.cell_phone.is_none());

        let trigger = req.into_trigger("agent-1".to_string());
        assert_eq!(trigger.operator_id, "agent-1");
        assert_eq!(trigger.lead_phone, "+15553334444");
        assert_eq!(trigger.contact_id, Some(42));
    }

    #[test]
    fn test_bridge_trigger_requires_lead_phone() {
        let req: BridgeTriggerRequest =
            serde_json::from_str(r#"{"leadPhone":"","fromNumber":"+15555556666"}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_disposition_request() {
        let req: DispositionRequest =
            serde_json::from_str(r#"{"outcome":"not_interested","notes":"call in May"}"#)
                .unwrap();
        assert_eq!(req.outcome, Disposition::NotInterested);
        assert!(req.validate().is_ok());

        let unknown = serde_json::from_str::<DispositionRequest>(r#"{"outcome":"maybe"}"#);
        assert!(unknown.is_err());
    }
}
