//! Normalized call-control events
//!
//! The telephony adapter turns provider webhooks into [`CallEvent`]s; the
//! rest of the engine never sees the provider wire format.

use crate::models::{CallDirection, CallLegStatus, HangupDetails, LegMetadata, StatusChange};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single provider event about one call leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    /// Provider event id, used to deduplicate deliveries
    pub event_id: String,

    /// Provider call-control id of the leg
    pub call_control_id: String,

    pub occurred_at: DateTime<Utc>,

    /// Opaque state echoed back by the provider
    pub client_state: Option<String>,

    pub kind: CallEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEventKind {
    Initiated {
        direction: CallDirection,
        from: String,
        to: String,
    },
    Ringing,
    Answered,
    Bridged,
    Hangup {
        cause: Option<String>,
        duration_secs: i32,
        cost: Option<Decimal>,
    },
    RecordingSaved {
        recording_url: String,
    },
    MachineDetectionEnded {
        result: String,
    },
}

impl CallEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            CallEventKind::Initiated { .. } => "call.initiated",
            CallEventKind::Ringing => "call.ringing",
            CallEventKind::Answered => "call.answered",
            CallEventKind::Bridged => "call.bridged",
            CallEventKind::Hangup { .. } => "call.hangup",
            CallEventKind::RecordingSaved { .. } => "call.recording.saved",
            CallEventKind::MachineDetectionEnded { .. } => "call.machine.detection.ended",
        }
    }

    /// Leg status this event moves to, `None` for metadata-only events
    pub fn target_status(&self) -> Option<CallLegStatus> {
        match self {
            CallEventKind::Initiated { .. } => Some(CallLegStatus::Initiated),
            CallEventKind::Ringing => Some(CallLegStatus::Ringing),
            CallEventKind::Answered => Some(CallLegStatus::Answered),
            CallEventKind::Bridged => Some(CallLegStatus::Bridged),
            CallEventKind::Hangup { .. } => Some(CallLegStatus::Hangup),
            CallEventKind::RecordingSaved { .. } | CallEventKind::MachineDetectionEnded { .. } => {
                None
            }
        }
    }
}

impl CallEvent {
    /// Status change carried by this event, if any
    pub fn status_change(&self) -> Option<StatusChange> {
        match &self.kind {
            CallEventKind::Hangup {
                cause,
                duration_secs,
                cost,
            } => Some(StatusChange::hangup(
                self.occurred_at,
                HangupDetails {
                    cause: cause.clone(),
                    duration_secs: *duration_secs,
                    cost: *cost,
                },
            )),
            kind => kind
                .target_status()
                .map(|to| StatusChange::new(to, self.occurred_at)),
        }
    }

    /// Metadata carried by this event, if any
    pub fn metadata(&self) -> Option<LegMetadata> {
        match &self.kind {
            CallEventKind::RecordingSaved { recording_url } => {
                Some(LegMetadata::Recording(recording_url.clone()))
            }
            CallEventKind::MachineDetectionEnded { result } => {
                Some(LegMetadata::MachineDetection(result.clone()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: CallEventKind) -> CallEvent {
        CallEvent {
            event_id: "ev-1".to_string(),
            call_control_id: "v3:leg".to_string(),
            occurred_at: Utc::now(),
            client_state: None,
            kind,
        }
    }

    #[test]
    fn test_hangup_change_carries_details() {
        let ev = event(CallEventKind::Hangup {
            cause: Some("normal_clearing".to_string()),
            duration_secs: 12,
            cost: None,
        });
        let change = ev.status_change().unwrap();
        assert_eq!(change.to, CallLegStatus::Hangup);
        assert_eq!(change.hangup.unwrap().duration_secs, 12);
        assert!(ev.metadata().is_none());
    }

    #[test]
    fn test_metadata_events_have_no_status() {
        let ev = event(CallEventKind::RecordingSaved {
            recording_url: "https://rec/a.mp3".to_string(),
        });
        assert!(ev.status_change().is_none());
        assert_eq!(
            ev.metadata(),
            Some(LegMetadata::Recording("https://rec/a.mp3".to_string()))
        );
        assert_eq!(ev.kind.name(), "call.recording.saved");
    }
}
