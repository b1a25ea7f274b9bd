//! Session and queue DTOs

use dialer_core::models::{ItemPatch, QueueItemStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Start a power-dial session
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    /// Contacts to queue, in CRM ids
    #[serde(default)]
    pub contact_ids: Vec<i64>,

    /// Caller id presented to prospects
    #[validate(length(min = 1, message = "Caller id is required"))]
    pub caller_id_number: String,

    pub priority: Option<i32>,
}

/// Add contacts to a session's queue
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    #[validate(length(min = 1, message = "At least one contact is required"))]
    pub contact_ids: Vec<i64>,

    pub priority: Option<i32>,
}

/// Remove contacts from a session's queue
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RemoveContactsRequest {
    #[validate(length(min = 1, message = "At least one contact is required"))]
    pub contact_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveContactsResponse {
    pub removed: u64,
}

/// Manual queue management
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QueueItemPatchRequest {
    #[validate(range(min = -1000, max = 1000))]
    pub priority: Option<i32>,
    pub status: Option<QueueItemStatus>,
}

impl QueueItemPatchRequest {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.status.is_none()
    }
}

impl From<QueueItemPatchRequest> for ItemPatch {
    fn from(req: QueueItemPatchRequest) -> Self {
        ItemPatch {
            priority: req.priority,
            status: req.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_session_request_uses_camel_case() {
        let req: StartSessionRequest = serde_json::from_str(
            r#"{"contactIds":[1,2,3],"callerIdNumber":"+15555556666","priority":5}"#,
        )
        .unwrap();
        assert_eq!(req.contact_ids, vec![1, 2, 3]);
        assert_eq!(req.caller_id_number, "+15555556666");
        assert_eq!(req.priority, Some(5));
        assert!(req.validate().is_ok());

        let empty = StartSessionRequest {
            caller_id_number: String::new(),
            ..req
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_enqueue_request_requires_contacts() {
        let req: EnqueueRequest = serde_json::from_str(r#"{"contactIds":[]}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_patch_request() {
        let req: QueueItemPatchRequest =
            serde_json::from_str(r#"{"status":"skipped"}"#).unwrap();
        assert!(!req.is_empty());
        let patch = ItemPatch::from(req);
        assert_eq!(patch.status, Some(QueueItemStatus::Skipped));
        assert!(patch.priority.is_none());

        let req: QueueItemPatchRequest = serde_json::from_str("{}").unwrap();
        assert!(req.is_empty());
    }
}
