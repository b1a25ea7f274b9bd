//! Call leg model and state machine
//!
//! Status only ever moves forward:
//!
//! ```text
//! INITIATED -> RINGING -> ANSWERED -> BRIDGED -> HANGUP
//! ```
//!
//! Any intermediate state may be skipped when the provider collapses events,
//! and `HANGUP` is terminal. A transition is valid iff the target ranks
//! strictly higher than the current status, which makes duplicate and stale
//! events no-ops.

use crate::models::Disposition;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Call leg status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallLegStatus {
    #[default]
    Initiated,
    Ringing,
    Answered,
    Bridged,
    Hangup,
}

impl CallLegStatus {
    const ALL: [CallLegStatus; 5] = [
        CallLegStatus::Initiated,
        CallLegStatus::Ringing,
        CallLegStatus::Answered,
        CallLegStatus::Bridged,
        CallLegStatus::Hangup,
    ];

    /// Position in the forward-only ordering
    pub fn rank(&self) -> u8 {
        match self {
            CallLegStatus::Initiated => 0,
            CallLegStatus::Ringing => 1,
            CallLegStatus::Answered => 2,
            CallLegStatus::Bridged => 3,
            CallLegStatus::Hangup => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallLegStatus::Initiated => "initiated",
            CallLegStatus::Ringing => "ringing",
            CallLegStatus::Answered => "answered",
            CallLegStatus::Bridged => "bridged",
            CallLegStatus::Hangup => "hangup",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initiated" => Some(CallLegStatus::Initiated),
            "ringing" => Some(CallLegStatus::Ringing),
            "answered" => Some(CallLegStatus::Answered),
            "bridged" => Some(CallLegStatus::Bridged),
            "hangup" => Some(CallLegStatus::Hangup),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallLegStatus::Hangup)
    }

    pub fn can_advance_to(&self, target: CallLegStatus) -> bool {
        target.rank() > self.rank()
    }

    /// All statuses from which `target` is reachable
    ///
    /// Stores use this list as the guard of their conditional update so the
    /// monotonic rule is enforced atomically.
    pub fn predecessors(target: CallLegStatus) -> Vec<CallLegStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|s| s.can_advance_to(target))
            .collect()
    }

    /// Whether the leg has been picked up in this status
    pub fn implies_answered(&self) -> bool {
        matches!(self, CallLegStatus::Answered | CallLegStatus::Bridged)
    }
}

impl fmt::Display for CallLegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    #[default]
    Outbound,
    Inbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Outbound => "outbound",
            CallDirection::Inbound => "inbound",
        }
    }

    /// Parse from string, accepting provider spellings
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "outbound" | "outgoing" => Some(CallDirection::Outbound),
            "inbound" | "incoming" => Some(CallDirection::Inbound),
            _ => None,
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call leg entity
///
/// Rows are never deleted; they are the permanent call history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLeg {
    /// Unique identifier
    pub id: Uuid,

    /// Provider call-control id; idempotency key for webhooks
    pub provider_call_id: String,

    /// Dial session, for power-dial legs
    pub session_id: Option<Uuid>,

    /// Queue item this leg dials
    pub queue_item_id: Option<Uuid>,

    /// CRM contact on the far end
    pub contact_id: Option<i64>,

    /// Contact display name at origination time
    pub contact_name: Option<String>,

    /// Operator the leg belongs to
    pub operator_id: Option<String>,

    pub from_number: String,
    pub to_number: String,
    pub direction: CallDirection,
    pub status: CallLegStatus,

    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Talk time in seconds
    pub duration_secs: Option<i32>,

    pub hangup_cause: Option<String>,
    pub recording_url: Option<String>,

    /// Answering machine detection result (human, machine, ...)
    pub machine_detection: Option<String>,

    pub cost: Option<Decimal>,
    pub disposition: Option<Disposition>,
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallLeg {
    /// Create a freshly originated leg
    pub fn new(
        provider_call_id: impl Into<String>,
        from_number: impl Into<String>,
        to_number: impl Into<String>,
        direction: CallDirection,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider_call_id: provider_call_id.into(),
            session_id: None,
            queue_item_id: None,
            contact_id: None,
            contact_name: None,
            operator_id: None,
            from_number: from_number.into(),
            to_number: to_number.into(),
            direction,
            status: CallLegStatus::Initiated,
            answered_at: None,
            ended_at: None,
            duration_secs: None,
            hangup_cause: None,
            recording_url: None,
            machine_detection: None,
            cost: None,
            disposition: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn was_answered(&self) -> bool {
        self.answered_at.is_some()
    }
}

/// Details captured from a hangup event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HangupDetails {
    pub cause: Option<String>,
    pub duration_secs: i32,
    pub cost: Option<Decimal>,
}

/// A forward status change to apply to a leg
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub to: CallLegStatus,
    pub at: DateTime<Utc>,
    pub hangup: Option<HangupDetails>,
}

impl StatusChange {
    pub fn new(to: CallLegStatus, at: DateTime<Utc>) -> Self {
        Self {
            to,
            at,
            hangup: None,
        }
    }

    pub fn hangup(at: DateTime<Utc>, details: HangupDetails) -> Self {
        Self {
            to: CallLegStatus::Hangup,
            at,
            hangup: Some(details),
        }
    }

    /// Apply the change in memory; stores with SQL guards mirror this logic
    pub fn apply_to(&self, leg: &mut CallLeg) -> bool {
        if !leg.status.can_advance_to(self.to) {
            return false;
        }

        leg.status = self.to;
        if self.to.implies_answered() && leg.answered_at.is_none() {
            leg.answered_at = Some(self.at);
        }
        if let Some(hangup) = &self.hangup {
            leg.ended_at = Some(self.at);
            leg.duration_secs = Some(hangup.duration_secs);
            if hangup.cause.is_some() {
                leg.hangup_cause = hangup.cause.clone();
            }
            if hangup.cost.is_some() {
                leg.cost = hangup.cost;
            }
        }
        leg.updated_at = Utc::now();
        true
    }
}

/// Late-arriving metadata that never changes status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegMetadata {
    Recording(String),
    MachineDetection(String),
}

impl LegMetadata {
    pub fn apply_to(&self, leg: &mut CallLeg) {
        match self {
            LegMetadata::Recording(url) => leg.recording_url = Some(url.clone()),
            LegMetadata::MachineDetection(result) => leg.machine_detection = Some(result.clone()),
        }
        leg.updated_at = Utc::now();
    }
}
