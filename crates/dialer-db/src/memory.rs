//! In-memory store implementation
//!
//! [`MemoryStore`] implements every repository and collaborator trait behind a
//! single mutex, mirroring the guards the PostgreSQL repositories express in
//! SQL. It backs the service tests and local runs without a database.
//!
//! Not durable: all state is lost when the process exits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{
        BridgeRequest, BridgeStatus, CallEvent, CallLeg, CallLegStatus, Contact, DialSession,
        Disposition, EnqueueResult, LedgerEntry, LegMetadata, Operator, QueueItem,
        QueueItemStatus, QueueOutcome, SessionStatus, StatusChange,
    },
    traits::{
        BillingLedger, BridgeRepository, CallLegRepository, ContactDirectory, OperatorDirectory,
        PhoneNumberInventory, QueueRepository, Repositories, SessionRepository,
        WebhookEventRepository,
    },
    AppError, AppResult,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Usage counters of one phone number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberUsage {
    pub call_count: i64,
    pub total_cost: Decimal,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct StoredEvent {
    event: CallEvent,
    processed: bool,
}

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<Uuid, DialSession>,
    items: HashMap<Uuid, QueueItem>,
    next_seq: i64,
    legs: HashMap<Uuid, CallLeg>,
    legs_by_provider: HashMap<String, Uuid>,
    bridges: HashMap<Uuid, BridgeRequest>,
    events: Vec<StoredEvent>,
    ledger: Vec<LedgerEntry>,
    numbers: HashMap<String, NumberUsage>,
    contacts: HashMap<i64, Contact>,
    operators: HashMap<String, Operator>,
}

impl State {
    fn session_view(&self, session: &DialSession) -> DialSession {
        let mut view = session.clone();
        view.cursor = self
            .items
            .values()
            .filter(|i| i.session_id == session.id && i.status.is_finished())
            .count() as i64;
        view.current_item_id = self
            .items
            .values()
            .find(|i| i.session_id == session.id && i.status == QueueItemStatus::Dialing)
            .map(|i| i.id);
        view
    }

    fn session_items(&self, session_id: Uuid) -> Vec<QueueItem> {
        let mut items: Vec<QueueItem> = self
            .items
            .values()
            .filter(|i| i.session_id == session_id)
            .cloned()
            .collect();
        items.sort_by(QueueItem::dequeue_order);
        items
    }

    fn leg_by_provider_mut(&mut self, provider_call_id: &str) -> Option<&mut CallLeg> {
        let id = self.legs_by_provider.get(provider_call_id)?;
        self.legs.get_mut(id)
    }

    fn bridge_by_leg_a_mut(&mut self, leg_a_call_id: &str) -> Option<&mut BridgeRequest> {
        self.bridges
            .values_mut()
            .find(|b| b.leg_a_call_id == leg_a_call_id)
    }
}

/// In-memory implementation of every store the engine needs
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose this store through the full repository bundle
    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            sessions: self.clone(),
            queue: self.clone(),
            legs: self.clone(),
            bridges: self.clone(),
            webhook_events: self.clone(),
            ledger: self.clone(),
            inventory: self.clone(),
            contacts: self.clone(),
            operators: self.clone(),
        }
    }

    pub fn add_contact(&self, id: i64, display_name: &str, phone: Option<&str>) {
        self.state.lock().contacts.insert(
            id,
            Contact {
                id,
                display_name: display_name.to_string(),
                phone: phone.map(str::to_string),
            },
        );
    }

    pub fn add_operator(&self, id: &str, cell_phone: Option<&str>) {
        self.state.lock().operators.insert(
            id.to_string(),
            Operator {
                id: id.to_string(),
                cell_phone: cell_phone.map(str::to_string),
            },
        );
    }

    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().ledger.clone()
    }

    pub fn number_usage(&self, number: &str) -> Option<NumberUsage> {
        self.state.lock().numbers.get(number).cloned()
    }

    /// Number of DIALING items in a session
    pub fn dialing_count(&self, session_id: Uuid) -> usize {
        self.state
            .lock()
            .items
            .values()
            .filter(|i| i.session_id == session_id && i.status == QueueItemStatus::Dialing)
            .count()
    }

    pub fn bridge_count(&self) -> usize {
        self.state.lock().bridges.len()
    }

    pub fn is_event_processed(&self, event_id: &str) -> Option<bool> {
        self.state
            .lock()
            .events
            .iter()
            .find(|e| e.event.event_id == event_id)
            .map(|e| e.processed)
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create(&self, session: &DialSession) -> AppResult<DialSession> {
        let mut state = self.state.lock();

        let open = state
            .sessions
            .values()
            .any(|s| s.owner_id == session.owner_id && s.status.is_open());
        if open {
            return Err(AppError::SessionAlreadyActive(session.owner_id.clone()));
        }

        state.sessions.insert(session.id, session.clone());
        Ok(state.session_view(session))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<DialSession>> {
        let state = self.state.lock();
        Ok(state.sessions.get(&id).map(|s| state.session_view(s)))
    }

    async fn find_open_for_owner(&self, owner_id: &str) -> AppResult<Option<DialSession>> {
        let state = self.state.lock();
        Ok(state
            .sessions
            .values()
            .find(|s| s.owner_id == owner_id && s.status.is_open())
            .map(|s| state.session_view(s)))
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> AppResult<Option<DialSession>> {
        let mut state = self.state.lock();

        let Some(session) = state.sessions.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&session.status) {
            return Ok(None);
        }

        let now = Utc::now();
        session.status = to;
        session.updated_at = now;
        if to == SessionStatus::Ended {
            session.ended_at = Some(now);
        }

        let session = session.clone();
        Ok(Some(state.session_view(&session)))
    }
}

#[async_trait]
impl QueueRepository for MemoryStore {
    async fn insert_items(
        &self,
        session_id: Uuid,
        contact_ids: &[i64],
        priority: Option<i32>,
    ) -> AppResult<EnqueueResult> {
        let mut state = self.state.lock();

        if !state.sessions.contains_key(&session_id) {
            return Err(AppError::NotFound(format!("Session {}", session_id)));
        }

        let priority = priority.unwrap_or_else(|| {
            state
                .items
                .values()
                .filter(|i| i.session_id == session_id)
                .map(|i| i.priority)
                .max()
                .map_or(0, |m| m.saturating_add(1))
        });

        let mut result = EnqueueResult::default();
        for &contact_id in contact_ids {
            let present = state
                .items
                .values()
                .any(|i| i.session_id == session_id && i.contact_id == contact_id);
            if present {
                result.rejected.push(contact_id);
                continue;
            }

            state.next_seq += 1;
            let item = QueueItem::new(session_id, contact_id, priority, state.next_seq);
            state.items.insert(item.id, item.clone());
            result.added.push(item);
        }

        Ok(result)
    }

    async fn dequeue_next(&self, session_id: Uuid) -> AppResult<QueueItem> {
        let mut state = self.state.lock();

        if !state.sessions.contains_key(&session_id) {
            return Err(AppError::NotFound(format!("Session {}", session_id)));
        }

        let items = state.session_items(session_id);
        if items.iter().any(|i| i.status == QueueItemStatus::Dialing) {
            return Err(AppError::DialInProgress(session_id.to_string()));
        }

        let next_id = items
            .iter()
            .find(|i| i.status == QueueItemStatus::Pending)
            .map(|i| i.id)
            .ok_or_else(|| AppError::EmptyQueue(session_id.to_string()))?;

        let item = state
            .items
            .get_mut(&next_id)
            .ok_or_else(|| AppError::Internal(format!("Queue item {} vanished", next_id)))?;
        item.status = QueueItemStatus::Dialing;
        item.attempts += 1;
        item.last_attempt_at = Some(Utc::now());

        Ok(item.clone())
    }

    async fn transition(
        &self,
        item_id: Uuid,
        to: QueueItemStatus,
        outcome: Option<QueueOutcome>,
    ) -> AppResult<QueueItem> {
        let mut state = self.state.lock();

        let (session_id, from) = match state.items.get(&item_id) {
            Some(item) => (item.session_id, item.status),
            None => return Err(AppError::NotFound(format!("Queue item {}", item_id))),
        };

        if !from.can_transition_to(to) {
            return Err(AppError::InvalidItemState(format!(
                "item {} cannot move from {} to {}",
                item_id, from, to
            )));
        }

        if to == QueueItemStatus::Dialing {
            let dialing = state
                .items
                .values()
                .any(|i| i.session_id == session_id && i.status == QueueItemStatus::Dialing);
            if dialing {
                return Err(AppError::DialInProgress(format!("item {}", item_id)));
            }
        }

        let item = state
            .items
            .get_mut(&item_id)
            .ok_or_else(|| AppError::NotFound(format!("Queue item {}", item_id)))?;

        item.status = to;
        item.completed_at = if to.is_finished() {
            Some(Utc::now())
        } else {
            None
        };
        if let Some(outcome) = outcome {
            item.was_contacted = outcome.was_contacted();
            item.was_answered = outcome.was_answered;
            item.disposition = Some(outcome.disposition);
        }

        Ok(item.clone())
    }

    async fn find_by_id(&self, item_id: Uuid) -> AppResult<Option<QueueItem>> {
        Ok(self.state.lock().items.get(&item_id).cloned())
    }

    async fn list(&self, session_id: Uuid) -> AppResult<Vec<QueueItem>> {
        Ok(self.state.lock().session_items(session_id))
    }

    async fn remove(&self, session_id: Uuid, contact_ids: &[i64]) -> AppResult<u64> {
        let mut state = self.state.lock();
        let before = state.items.len();

        state.items.retain(|_, i| {
            !(i.session_id == session_id
                && contact_ids.contains(&i.contact_id)
                && matches!(i.status, QueueItemStatus::Pending | QueueItemStatus::Skipped))
        });

        Ok((before - state.items.len()) as u64)
    }

    async fn update_priority(&self, item_id: Uuid, priority: i32) -> AppResult<QueueItem> {
        let mut state = self.state.lock();
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or_else(|| AppError::NotFound(format!("Queue item {}", item_id)))?;
        item.priority = priority;
        Ok(item.clone())
    }
}

#[async_trait]
impl CallLegRepository for MemoryStore {
    async fn insert(&self, leg: &CallLeg) -> AppResult<CallLeg> {
        let mut state = self.state.lock();

        if state.legs_by_provider.contains_key(&leg.provider_call_id) {
            return Err(AppError::Conflict(format!(
                "Call leg {} already exists",
                leg.provider_call_id
            )));
        }

        state
            .legs_by_provider
            .insert(leg.provider_call_id.clone(), leg.id);
        state.legs.insert(leg.id, leg.clone());
        Ok(leg.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallLeg>> {
        Ok(self.state.lock().legs.get(&id).cloned())
    }

    async fn find_by_provider_id(&self, provider_call_id: &str) -> AppResult<Option<CallLeg>> {
        let state = self.state.lock();
        Ok(state
            .legs_by_provider
            .get(provider_call_id)
            .and_then(|id| state.legs.get(id))
            .cloned())
    }

    async fn find_by_queue_item(&self, item_id: Uuid) -> AppResult<Option<CallLeg>> {
        Ok(self
            .state
            .lock()
            .legs
            .values()
            .filter(|l| l.queue_item_id == Some(item_id))
            .max_by_key(|l| l.created_at)
            .cloned())
    }

    async fn list_for_session(&self, session_id: Uuid) -> AppResult<Vec<CallLeg>> {
        let mut legs: Vec<CallLeg> = self
            .state
            .lock()
            .legs
            .values()
            .filter(|l| l.session_id == Some(session_id))
            .cloned()
            .collect();
        legs.sort_by_key(|l| l.created_at);
        Ok(legs)
    }

    async fn advance(
        &self,
        provider_call_id: &str,
        change: &StatusChange,
    ) -> AppResult<Option<CallLeg>> {
        let mut state = self.state.lock();
        let Some(leg) = state.leg_by_provider_mut(provider_call_id) else {
            return Ok(None);
        };

        if !CallLegStatus::predecessors(change.to).contains(&leg.status) {
            return Ok(None);
        }

        change.apply_to(leg);
        Ok(Some(leg.clone()))
    }

    async fn attach_metadata(
        &self,
        provider_call_id: &str,
        metadata: &LegMetadata,
    ) -> AppResult<Option<CallLeg>> {
        let mut state = self.state.lock();
        Ok(state.leg_by_provider_mut(provider_call_id).map(|leg| {
            metadata.apply_to(leg);
            leg.clone()
        }))
    }

    async fn set_disposition(
        &self,
        id: Uuid,
        disposition: Disposition,
        notes: Option<&str>,
    ) -> AppResult<CallLeg> {
        let mut state = self.state.lock();
        let leg = state
            .legs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Call leg {}", id)))?;

        leg.disposition = Some(disposition);
        if let Some(notes) = notes {
            leg.notes = Some(notes.to_string());
        }
        leg.updated_at = Utc::now();
        Ok(leg.clone())
    }
}

#[async_trait]
impl BridgeRepository for MemoryStore {
    async fn insert(&self, request: &BridgeRequest) -> AppResult<BridgeRequest> {
        let mut state = self.state.lock();
        if state
            .bridges
            .values()
            .any(|b| b.leg_a_call_id == request.leg_a_call_id)
        {
            return Err(AppError::Conflict(format!(
                "Bridge for leg {} already exists",
                request.leg_a_call_id
            )));
        }
        state.bridges.insert(request.id, request.clone());
        Ok(request.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<BridgeRequest>> {
        Ok(self.state.lock().bridges.get(&id).cloned())
    }

    async fn find_by_leg_a(&self, leg_a_call_id: &str) -> AppResult<Option<BridgeRequest>> {
        Ok(self
            .state
            .lock()
            .bridges
            .values()
            .find(|b| b.leg_a_call_id == leg_a_call_id)
            .cloned())
    }

    async fn claim(
        &self,
        leg_a_call_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Option<BridgeRequest>> {
        let mut state = self.state.lock();
        let Some(bridge) = state.bridge_by_leg_a_mut(leg_a_call_id) else {
            return Ok(None);
        };
        if !bridge.is_claimable_at(at) {
            return Ok(None);
        }

        bridge.consumed = true;
        bridge.updated_at = Utc::now();
        Ok(Some(bridge.clone()))
    }

    async fn mark_bridged(&self, id: Uuid, leg_b_call_id: &str) -> AppResult<BridgeRequest> {
        let mut state = self.state.lock();
        let bridge = state
            .bridges
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Bridge request {}", id)))?;

        bridge.status = BridgeStatus::Bridged;
        bridge.leg_b_call_id = Some(leg_b_call_id.to_string());
        bridge.updated_at = Utc::now();
        Ok(bridge.clone())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        leg_b_call_id: Option<&str>,
        reason: &str,
    ) -> AppResult<BridgeRequest> {
        let mut state = self.state.lock();
        let bridge = state
            .bridges
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Bridge request {}", id)))?;

        bridge.status = BridgeStatus::Failed;
        if let Some(leg_b) = leg_b_call_id {
            bridge.leg_b_call_id = Some(leg_b.to_string());
        }
        bridge.failure_reason = Some(reason.to_string());
        bridge.updated_at = Utc::now();
        Ok(bridge.clone())
    }

    async fn expire_for_leg(&self, leg_a_call_id: &str) -> AppResult<Option<BridgeRequest>> {
        let mut state = self.state.lock();
        let Some(bridge) = state.bridge_by_leg_a_mut(leg_a_call_id) else {
            return Ok(None);
        };
        if bridge.consumed || bridge.status != BridgeStatus::Pending {
            return Ok(None);
        }

        bridge.status = BridgeStatus::Expired;
        bridge.updated_at = Utc::now();
        Ok(Some(bridge.clone()))
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> AppResult<Vec<BridgeRequest>> {
        let mut state = self.state.lock();
        let mut expired = Vec::new();

        for bridge in state.bridges.values_mut() {
            if !bridge.consumed
                && bridge.status == BridgeStatus::Pending
                && bridge.is_expired_at(now)
            {
                bridge.status = BridgeStatus::Expired;
                bridge.updated_at = Utc::now();
                expired.push(bridge.clone());
            }
        }

        Ok(expired)
    }

    async fn purge_finished(&self, older_than: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock();
        let before = state.bridges.len();
        state
            .bridges
            .retain(|_, b| !(b.status.is_finished() && b.updated_at < older_than));
        Ok((before - state.bridges.len()) as u64)
    }
}

#[async_trait]
impl WebhookEventRepository for MemoryStore {
    async fn record(&self, event: &CallEvent) -> AppResult<bool> {
        let mut state = self.state.lock();
        if state
            .events
            .iter()
            .any(|e| e.event.event_id == event.event_id)
        {
            return Ok(false);
        }

        state.events.push(StoredEvent {
            event: event.clone(),
            processed: false,
        });
        Ok(true)
    }

    async fn mark_processed(&self, event_id: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(stored) = state
            .events
            .iter_mut()
            .find(|e| e.event.event_id == event_id)
        {
            stored.processed = true;
        }
        Ok(())
    }

    async fn find_unprocessed(&self, limit: i64) -> AppResult<Vec<CallEvent>> {
        Ok(self
            .state
            .lock()
            .events
            .iter()
            .filter(|e| !e.processed)
            .take(limit.max(0) as usize)
            .map(|e| e.event.clone())
            .collect())
    }
}

#[async_trait]
impl BillingLedger for MemoryStore {
    async fn append(&self, entry: &LedgerEntry) -> AppResult<bool> {
        let mut state = self.state.lock();
        if state
            .ledger
            .iter()
            .any(|e| e.provider_call_id == entry.provider_call_id)
        {
            return Ok(false);
        }
        state.ledger.push(entry.clone());
        Ok(true)
    }
}

#[async_trait]
impl PhoneNumberInventory for MemoryStore {
    async fn record_usage(&self, number: &str, cost: Option<Decimal>) -> AppResult<()> {
        let mut state = self.state.lock();
        let usage = state.numbers.entry(number.to_string()).or_default();
        usage.call_count += 1;
        usage.total_cost += cost.unwrap_or(Decimal::ZERO);
        usage.last_used_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for MemoryStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Contact>> {
        Ok(self.state.lock().contacts.get(&id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<Contact>> {
        let state = self.state.lock();
        let mut matches: Vec<&Contact> = state
            .contacts
            .values()
            .filter(|c| c.phone.as_deref() == Some(phone))
            .collect();
        matches.sort_by_key(|c| c.id);
        Ok(matches.first().map(|c| (*c).clone()))
    }
}

#[async_trait]
impl OperatorDirectory for MemoryStore {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Operator>> {
        Ok(self.state.lock().operators.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dialer_core::models::{CallDirection, HangupDetails};
    use rust_decimal_macros::dec;

    async fn session(store: &MemoryStore) -> DialSession {
        SessionRepository::create(store, &DialSession::new("agent-1", "+15555556666"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_one_open_session_per_owner() {
        let store = MemoryStore::new();
        let first = session(&store).await;

        let err = SessionRepository::create(&store, &DialSession::new("agent-1", "+15555556666"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionAlreadyActive(_)));

        store
            .update_status(first.id, &[SessionStatus::Active], SessionStatus::Ended)
            .await
            .unwrap()
            .unwrap();
        assert!(SessionRepository::create(&store, &DialSession::new("agent-1", "+15555556666"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_duplicates_and_bumps_priority() {
        let store = MemoryStore::new();
        let s = session(&store).await;

        let first = store.insert_items(s.id, &[1, 2], Some(3)).await.unwrap();
        assert_eq!(first.added.len(), 2);

        let second = store.insert_items(s.id, &[2, 3], None).await.unwrap();
        assert_eq!(second.rejected, vec![2]);
        assert_eq!(second.added[0].priority, 4);

        let order: Vec<i64> = store
            .list(s.id)
            .await
            .unwrap()
            .iter()
            .map(|i| i.contact_id)
            .collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_default_priority_saturates_at_max() {
        let store = MemoryStore::new();
        let s = session(&store).await;

        store.insert_items(s.id, &[1], Some(i32::MAX)).await.unwrap();
        let next = store.insert_items(s.id, &[2], None).await.unwrap();

        assert_eq!(next.added.len(), 1);
        assert_eq!(next.added[0].priority, i32::MAX);
    }

    #[tokio::test]
    async fn test_dequeue_is_exclusive() {
        let store = MemoryStore::new();
        let s = session(&store).await;
        store.insert_items(s.id, &[1, 2], None).await.unwrap();

        let item = store.dequeue_next(s.id).await.unwrap();
        assert_eq!(item.status, QueueItemStatus::Dialing);
        assert_eq!(item.attempts, 1);

        let err = store.dequeue_next(s.id).await.unwrap_err();
        assert!(matches!(err, AppError::DialInProgress(_)));
        assert_eq!(store.dialing_count(s.id), 1);

        let view = SessionRepository::find_by_id(&store, s.id).await.unwrap().unwrap();
        assert_eq!(view.current_item_id, Some(item.id));
        assert_eq!(view.cursor, 0);
    }

    #[tokio::test]
    async fn test_completed_item_cannot_requeue() {
        let store = MemoryStore::new();
        let s = session(&store).await;
        store.insert_items(s.id, &[1], None).await.unwrap();
        let item = store.dequeue_next(s.id).await.unwrap();

        let done = store
            .transition(
                item.id,
                QueueItemStatus::Completed,
                Some(QueueOutcome::new(Disposition::Interested, true)),
            )
            .await
            .unwrap();
        assert!(done.completed_at.is_some());
        assert!(done.was_contacted);

        let err = store
            .transition(item.id, QueueItemStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidItemState(_)));

        let view = SessionRepository::find_by_id(&store, s.id).await.unwrap().unwrap();
        assert_eq!(view.cursor, 1);
        assert!(view.current_item_id.is_none());
    }

    #[tokio::test]
    async fn test_leg_advance_is_monotonic() {
        let store = MemoryStore::new();
        let leg = CallLeg::new("v3:1", "+15555556666", "+15553334444", CallDirection::Outbound);
        CallLegRepository::insert(&store, &leg).await.unwrap();

        let now = Utc::now();
        let hangup = StatusChange::hangup(
            now,
            HangupDetails {
                cause: Some("normal_clearing".to_string()),
                duration_secs: 30,
                cost: Some(dec!(0.02)),
            },
        );
        assert!(store.advance("v3:1", &hangup).await.unwrap().is_some());
        assert!(store.advance("v3:1", &hangup).await.unwrap().is_none());
        assert!(store
            .advance("v3:1", &StatusChange::new(CallLegStatus::Ringing, now))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .advance("v3:missing", &StatusChange::new(CallLegStatus::Ringing, now))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_bridge_claimed_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let bridge = BridgeRequest {
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
            expires_at: now + Duration::seconds(30),
            created_at: now,
            updated_at: now,
        };
        BridgeRepository::insert(&store, &bridge).await.unwrap();

        assert!(store.claim("v3:a", now).await.unwrap().is_some());
        assert!(store.claim("v3:a", now).await.unwrap().is_none());
        assert!(store.expire_for_leg("v3:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledger_is_idempotent_per_call() {
        let store = MemoryStore::new();
        let entry = LedgerEntry {
            provider_call_id: "v3:1".to_string(),
            call_leg_id: Uuid::new_v4(),
            phone_number: "+15555556666".to_string(),
            cost: dec!(0.10),
            recorded_at: Utc::now(),
        };
        assert!(store.append(&entry).await.unwrap());
        assert!(!store.append(&entry).await.unwrap());
        assert_eq!(store.ledger_entries().len(), 1);
    }
}
