//! Dial queue models
//!
//! Items are dequeued by (priority desc, arrival asc). Arrival order is the
//! store-assigned `seq`, which breaks ties between items added in the same
//! instant.

use crate::models::Disposition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Queue item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Waiting to be dialed
    #[default]
    Pending,
    /// Currently being dialed (at most one per session)
    Dialing,
    /// Dialed and dispositioned
    Completed,
    /// Could not be dialed
    Failed,
    /// Skipped by the operator
    Skipped,
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemStatus::Pending => "pending",
            QueueItemStatus::Dialing => "dialing",
            QueueItemStatus::Completed => "completed",
            QueueItemStatus::Failed => "failed",
            QueueItemStatus::Skipped => "skipped",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(QueueItemStatus::Pending),
            "dialing" => Some(QueueItemStatus::Dialing),
            "completed" => Some(QueueItemStatus::Completed),
            "failed" => Some(QueueItemStatus::Failed),
            "skipped" => Some(QueueItemStatus::Skipped),
            _ => None,
        }
    }

    /// Whether the item has left the dialable part of the queue
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            QueueItemStatus::Completed | QueueItemStatus::Failed | QueueItemStatus::Skipped
        )
    }

    /// Statuses an item may move to `target` from
    ///
    /// `Pending` is reachable from `Dialing` (requeue after a failed
    /// origination) and from `Skipped`/`Failed` (manual retry).
    pub fn allowed_predecessors(target: QueueItemStatus) -> &'static [QueueItemStatus] {
        use QueueItemStatus::*;
        match target {
            Pending => &[Dialing, Skipped, Failed],
            Dialing => &[Pending],
            Completed => &[Dialing],
            Failed => &[Pending, Dialing],
            Skipped => &[Pending, Dialing],
        }
    }

    pub fn can_transition_to(&self, target: QueueItemStatus) -> bool {
        Self::allowed_predecessors(target).contains(self)
    }
}

/// One contact queued for dialing within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique identifier
    pub id: Uuid,

    /// Owning session
    pub session_id: Uuid,

    /// CRM contact to dial
    pub contact_id: i64,

    /// Higher dials first
    pub priority: i32,

    /// Current status
    pub status: QueueItemStatus,

    /// Number of times the item entered DIALING
    pub attempts: i32,

    /// When the item last entered DIALING
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// A conversation took place
    pub was_contacted: bool,

    /// The call was answered
    pub was_answered: bool,

    /// Outcome recorded when the item completed
    pub disposition: Option<Disposition>,

    /// Arrival sequence within the store
    pub seq: i64,

    /// Arrival timestamp
    pub added_at: DateTime<Utc>,

    /// Stamped by every terminal transition
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub fn new(session_id: Uuid, contact_id: i64, priority: i32, seq: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            contact_id,
            priority,
            status: QueueItemStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            was_contacted: false,
            was_answered: false,
            disposition: None,
            seq,
            added_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Dequeue ordering: higher priority first, then earlier arrival
    pub fn dequeue_order(a: &QueueItem, b: &QueueItem) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.added_at.cmp(&b.added_at))
            .then_with(|| a.seq.cmp(&b.seq))
    }
}

/// Outcome written onto a queue item when it completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOutcome {
    pub disposition: Disposition,
    pub was_answered: bool,
}

impl QueueOutcome {
    pub fn new(disposition: Disposition, was_answered: bool) -> Self {
        Self {
            disposition,
            was_answered,
        }
    }

    pub fn was_contacted(&self) -> bool {
        self.disposition.is_contact()
    }
}

/// Result of an enqueue request
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnqueueResult {
    /// Items created by this request
    pub added: Vec<QueueItem>,

    /// Contact ids already present in the session
    pub rejected: Vec<i64>,
}

/// Queue management patch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    pub priority: Option<i32>,
    pub status: Option<QueueItemStatus>,
}
