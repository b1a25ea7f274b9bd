//! Common traits for repositories and collaborators
//!
//! Every durable concern of the engine sits behind one of these traits so the
//! services run unchanged against PostgreSQL or the in-memory store.

use crate::error::AppError;
use crate::models::{
    BridgeRequest, CallEvent, CallLeg, Contact, DialSession, Disposition, EnqueueResult,
    LedgerEntry, LegMetadata, Operator, QueueItem, QueueItemStatus, QueueOutcome, SessionStatus,
    StatusChange,
};
use crate::phone::PhoneNumber;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Dial session persistence
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new session; fails with `SessionAlreadyActive` when the owner
    /// already has an open (active or paused) session
    async fn create(&self, session: &DialSession) -> Result<DialSession, AppError>;

    /// Find session by ID, with cursor and current item computed
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DialSession>, AppError>;

    /// Find the owner's open session, if any
    async fn find_open_for_owner(&self, owner_id: &str) -> Result<Option<DialSession>, AppError>;

    /// Move a session to `to` if its status is one of `from`
    ///
    /// Returns `None` when the guard did not match.
    async fn update_status(
        &self,
        id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> Result<Option<DialSession>, AppError>;
}

/// Dial queue persistence
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Add contacts to a session queue
    ///
    /// Contacts already present in the session (in any status) are rejected.
    /// Without an explicit priority the batch gets one above the current max.
    async fn insert_items(
        &self,
        session_id: Uuid,
        contact_ids: &[i64],
        priority: Option<i32>,
    ) -> Result<EnqueueResult, AppError>;

    /// Atomically move the next PENDING item to DIALING
    ///
    /// Fails with `DialInProgress` when the session already has a DIALING
    /// item and with `EmptyQueue` when nothing is pending.
    async fn dequeue_next(&self, session_id: Uuid) -> Result<QueueItem, AppError>;

    /// Conditional status transition guarded by the item state machine
    async fn transition(
        &self,
        item_id: Uuid,
        to: QueueItemStatus,
        outcome: Option<QueueOutcome>,
    ) -> Result<QueueItem, AppError>;

    async fn find_by_id(&self, item_id: Uuid) -> Result<Option<QueueItem>, AppError>;

    /// All items of a session in dequeue order
    async fn list(&self, session_id: Uuid) -> Result<Vec<QueueItem>, AppError>;

    /// Remove PENDING or SKIPPED items for the given contacts
    async fn remove(&self, session_id: Uuid, contact_ids: &[i64]) -> Result<u64, AppError>;

    async fn update_priority(&self, item_id: Uuid, priority: i32) -> Result<QueueItem, AppError>;
}

/// Call leg persistence
#[async_trait]
pub trait CallLegRepository: Send + Sync {
    /// Insert a leg; the provider call id is unique
    async fn insert(&self, leg: &CallLeg) -> Result<CallLeg, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CallLeg>, AppError>;

    async fn find_by_provider_id(&self, provider_call_id: &str)
        -> Result<Option<CallLeg>, AppError>;

    /// Most recent leg originated for a queue item
    async fn find_by_queue_item(&self, item_id: Uuid) -> Result<Option<CallLeg>, AppError>;

    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<CallLeg>, AppError>;

    /// Apply a forward status change
    ///
    /// The update is conditional on the leg being in one of the target's
    /// predecessor statuses. Returns `None` when nothing changed.
    async fn advance(
        &self,
        provider_call_id: &str,
        change: &StatusChange,
    ) -> Result<Option<CallLeg>, AppError>;

    /// Attach metadata without touching status
    async fn attach_metadata(
        &self,
        provider_call_id: &str,
        metadata: &LegMetadata,
    ) -> Result<Option<CallLeg>, AppError>;

    async fn set_disposition(
        &self,
        id: Uuid,
        disposition: Disposition,
        notes: Option<&str>,
    ) -> Result<CallLeg, AppError>;
}

/// Bridge request persistence
#[async_trait]
pub trait BridgeRepository: Send + Sync {
    async fn insert(&self, request: &BridgeRequest) -> Result<BridgeRequest, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BridgeRequest>, AppError>;

    async fn find_by_leg_a(&self, leg_a_call_id: &str) -> Result<Option<BridgeRequest>, AppError>;

    /// Flip `consumed` on a pending request that had not expired at `at`
    ///
    /// Only one caller ever receives `Some` for a given request.
    async fn claim(
        &self,
        leg_a_call_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<BridgeRequest>, AppError>;

    async fn mark_bridged(&self, id: Uuid, leg_b_call_id: &str) -> Result<BridgeRequest, AppError>;

    async fn mark_failed(
        &self,
        id: Uuid,
        leg_b_call_id: Option<&str>,
        reason: &str,
    ) -> Result<BridgeRequest, AppError>;

    /// Expire the pending, unconsumed request of a terminated leg A
    async fn expire_for_leg(&self, leg_a_call_id: &str)
        -> Result<Option<BridgeRequest>, AppError>;

    /// Expire every pending, unconsumed request past its deadline
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<BridgeRequest>, AppError>;

    /// Delete finished requests last updated before `older_than`
    async fn purge_finished(&self, older_than: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Durable webhook inbox
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Persist an event; returns false if the event id was already recorded
    async fn record(&self, event: &CallEvent) -> Result<bool, AppError>;

    async fn mark_processed(&self, event_id: &str) -> Result<(), AppError>;

    /// Unprocessed events in arrival order
    async fn find_unprocessed(&self, limit: i64) -> Result<Vec<CallEvent>, AppError>;
}

/// Append-only billing ledger
#[async_trait]
pub trait BillingLedger: Send + Sync {
    /// Append an entry; returns false if the call was already billed
    async fn append(&self, entry: &LedgerEntry) -> Result<bool, AppError>;
}

/// Phone number inventory usage counters
#[async_trait]
pub trait PhoneNumberInventory: Send + Sync {
    async fn record_usage(&self, number: &str, cost: Option<Decimal>) -> Result<(), AppError>;
}

/// Contact lookup
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Contact>, AppError>;

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Contact>, AppError>;
}

/// Operator lookup
#[async_trait]
pub trait OperatorDirectory: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Operator>, AppError>;
}

/// Outbound dial request
#[derive(Debug, Clone, PartialEq)]
pub struct DialRequest {
    pub to: PhoneNumber,
    pub from: PhoneNumber,
    /// Correlation state echoed on every webhook for the leg
    pub client_state: Option<String>,
    /// Ring timeout
    pub timeout_secs: Option<u64>,
}

/// Telephony provider call control
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Originate a call; returns the provider call-control id
    async fn dial(&self, request: &DialRequest) -> Result<String, AppError>;

    /// Join two live legs into one conversation
    async fn bridge(&self, call_control_id: &str, other_call_control_id: &str)
        -> Result<(), AppError>;

    async fn hangup(&self, call_control_id: &str) -> Result<(), AppError>;
}

/// Bundle of every store the engine needs
#[derive(Clone)]
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepository>,
    pub queue: Arc<dyn QueueRepository>,
    pub legs: Arc<dyn CallLegRepository>,
    pub bridges: Arc<dyn BridgeRepository>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub ledger: Arc<dyn BillingLedger>,
    pub inventory: Arc<dyn PhoneNumberInventory>,
    pub contacts: Arc<dyn ContactDirectory>,
    pub operators: Arc<dyn OperatorDirectory>,
}
