//! Click-to-call via the operator's cell


use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dialer_core::config::DialerConfig;
use dialer_core::models::{
    BridgeStatus, CallLeg, CallLegStatus, Disposition, LegMetadata, StatusChange,
};
use dialer_core::traits::{CallLegRepository, DialRequest};
use dialer_core::{AppError, AppResult, CorrelationToken, PhoneNumber};
use dialer_db::MemoryStore;
use dialer_services::{BridgeTrigger, Dialer, DialerEvent};
use harness::{answered, hangup, harness, harness_with, MockTelephony, OPERATOR};
use mockall::predicate::eq;
use std::sync::Arc;
use uuid::Uuid;

const CELL: &str = "+15551112222";
const PROSPECT: &str = "+15553334444";
const CALLER_ID: &str = "+15555556666";

fn trigger(lead_phone: &str) -> BridgeTrigger {
    BridgeTrigger {
        operator_id: OPERATOR.to_string(),
        cell_phone: Some(CELL.to_string()),
        lead_phone: lead_phone.to_string(),
        from_number: CALLER_ID.to_string(),
        contact_id: Some(42),
    }
}

fn expect_leg_a(telephony: &mut MockTelephony) {
    telephony
        .expect_dial()
        .withf(|req: &DialRequest| req.to.as_str() == CELL && req.client_state.is_some())
        .times(1)
        .returning(|_| Ok("leg-a".to_string()));
}

#[tokio::test]
async fn test_bridge_happy_path() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    telephony
        .expect_dial()
        .withf(|req: &DialRequest| {
            req.to.as_str() == PROSPECT
                && req.from.as_str() == CALLER_ID
                && req.client_state.is_none()
        })
        .times(1)
        .returning(|_| Ok("leg-b".to_string()));
    telephony
        .expect_bridge()
        .with(eq("leg-a"), eq("leg-b"))
        .times(1)
        .returning(|_, _| Ok(()));
    let h = harness(telephony);

    let request = h.dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap();
    assert_eq!(request.status, BridgeStatus::Pending);
    assert_eq!(request.leg_a_call_id, "leg-a");

    let leg_a = h.dialer.tracker.find_by_provider_id("leg-a").await.unwrap().unwrap();
    assert_eq!(leg_a.status, CallLegStatus::Initiated);
    assert_eq!(leg_a.to_number, CELL);

    h.dialer
        .webhooks
        .process(&answered("leg-a", Some(&request.correlation_token)))
        .await
        .unwrap();

    let bridged = h.dialer.bridges.get(request.id).await.unwrap();
    assert_eq!(bridged.status, BridgeStatus::Bridged);
    assert_eq!(bridged.leg_b_call_id.as_deref(), Some("leg-b"));

    let leg_b = h.dialer.tracker.find_by_provider_id("leg-b").await.unwrap().unwrap();
    assert_eq!(leg_b.to_number, PROSPECT);
    assert_eq!(leg_b.contact_id, Some(42));
}

#[tokio::test]
async fn test_leg_b_dialed_once_for_repeated_answers() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    telephony
        .expect_dial()
        .withf(|req: &DialRequest| req.to.as_str() == PROSPECT)
        .times(1)
        .returning(|_| Ok("leg-b".to_string()));
    telephony.expect_bridge().times(1).returning(|_, _| Ok(()));
    let h = harness(telephony);

    let request = h.dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap();
    let token = request.correlation_token.clone();

    let first_event = answered("leg-a", Some(&token));
    let second_event = answered("leg-a", Some(&token));
    let (first, second) = tokio::join!(
        h.dialer.webhooks.process(&first_event),
        h.dialer.webhooks.process(&second_event)
    );
    first.unwrap();
    second.unwrap();
    h.dialer
        .webhooks
        .process(&answered("leg-a", Some(&token)))
        .await
        .unwrap();

    let bridged = h.dialer.bridges.get(request.id).await.unwrap();
    assert_eq!(bridged.status, BridgeStatus::Bridged);
}

#[tokio::test]
async fn test_leg_a_hangup_expires_bridge() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    telephony.expect_bridge().never();
    let h = harness(telephony);

    let request = h.dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap();
    h.dialer
        .webhooks
        .process(&hangup("leg-a", 0, None))
        .await
        .unwrap();

    let expired = h.dialer.bridges.get(request.id).await.unwrap();
    assert_eq!(expired.status, BridgeStatus::Expired);

    // A late answer cannot revive it
    h.dialer
        .webhooks
        .process(&answered("leg-a", Some(&request.correlation_token)))
        .await
        .unwrap();
    assert_eq!(
        h.dialer.bridges.get(request.id).await.unwrap().status,
        BridgeStatus::Expired
    );
}

#[tokio::test]
async fn test_invalid_prospect_number_makes_no_call() {
    let mut telephony = MockTelephony::new();
    telephony.expect_dial().never();
    let h = harness(telephony);

    let err = h.dialer.bridges.request_bridge(trigger("abc")).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidNumber(_)));
    assert_eq!(h.store.bridge_count(), 0);
}

#[tokio::test]
async fn test_cell_number_comes_from_operator_directory() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    let h = harness(telephony);
    h.store.add_operator(OPERATOR, Some("555-111-2222"));

    let mut request = trigger(PROSPECT);
    request.cell_phone = None;
    let bridge = h.dialer.bridges.request_bridge(request).await.unwrap();
    assert_eq!(bridge.operator_number, CELL);
}

#[tokio::test]
async fn test_operator_without_cell_is_rejected() {
    let mut telephony = MockTelephony::new();
    telephony.expect_dial().never();
    let h = harness(telephony);
    h.store.add_operator(OPERATOR, None);

    let mut request = trigger(PROSPECT);
    request.cell_phone = None;
    let err = h.dialer.bridges.request_bridge(request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_rejected_leg_a_leaves_no_state() {
    let mut telephony = MockTelephony::new();
    telephony
        .expect_dial()
        .times(1)
        .returning(|_| Err(AppError::Provider("422: Destination is invalid".to_string())));
    let h = harness(telephony);

    let err = h.dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap_err();
    assert!(matches!(err, AppError::BridgeOriginationFailed(_)));
    assert_eq!(h.store.bridge_count(), 0);
}

#[tokio::test]
async fn test_leg_b_failure_is_recorded_not_raised() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    telephony
        .expect_dial()
        .withf(|req: &DialRequest| req.to.as_str() == PROSPECT)
        .times(1)
        .returning(|_| Err(AppError::Provider("486 Busy".to_string())));
    telephony.expect_bridge().never();
    let h = harness(telephony);
    let mut feed = h.dialer.bus.subscribe();

    let request = h.dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap();
    h.dialer
        .webhooks
        .process(&answered("leg-a", Some(&request.correlation_token)))
        .await
        .unwrap();

    let failed = h.dialer.bridges.get(request.id).await.unwrap();
    assert_eq!(failed.status, BridgeStatus::Failed);
    assert!(failed.failure_reason.unwrap().contains("486 Busy"));

    let mut notified = false;
    while let Ok(event) = feed.try_recv() {
        if let DialerEvent::BridgeLegFailed { bridge_id, .. } = event {
            notified = bridge_id == request.id;
        }
    }
    assert!(notified);

    // Leg A is still up
    let leg_a = h.dialer.tracker.find_by_provider_id("leg-a").await.unwrap().unwrap();
    assert_eq!(leg_a.status, CallLegStatus::Answered);
}

#[tokio::test]
async fn test_bridge_command_failure_hangs_up_leg_b() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    telephony
        .expect_dial()
        .withf(|req: &DialRequest| req.to.as_str() == PROSPECT)
        .times(1)
        .returning(|_| Ok("leg-b".to_string()));
    telephony
        .expect_bridge()
        .times(1)
        .returning(|_, _| Err(AppError::Provider("call not found".to_string())));
    telephony
        .expect_hangup()
        .with(eq("leg-b"))
        .times(1)
        .returning(|_| Ok(()));
    let h = harness(telephony);

    let request = h.dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap();
    h.dialer
        .webhooks
        .process(&answered("leg-a", Some(&request.correlation_token)))
        .await
        .unwrap();

    let failed = h.dialer.bridges.get(request.id).await.unwrap();
    assert_eq!(failed.status, BridgeStatus::Failed);
    assert_eq!(failed.leg_b_call_id.as_deref(), Some("leg-b"));
}

#[tokio::test]
async fn test_foreign_token_is_rejected() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    telephony
        .expect_dial()
        .withf(|req: &DialRequest| req.client_state.is_none())
        .never();
    let h = harness(telephony);

    let request = h.dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap();

    let forged = CorrelationToken::new(
        OPERATOR,
        PhoneNumber::parse("+15559990000").unwrap(),
        PhoneNumber::parse(CALLER_ID).unwrap(),
        Some(42),
    )
    .encode()
    .unwrap();

    // Absorbed by the processor, recorded on the request
    h.dialer
        .webhooks
        .process(&answered("leg-a", Some(&forged)))
        .await
        .unwrap();

    let failed = h.dialer.bridges.get(request.id).await.unwrap();
    assert_eq!(failed.status, BridgeStatus::Failed);
    assert!(failed.consumed);
}

#[tokio::test]
async fn test_unanswered_bridge_times_out() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    telephony
        .expect_hangup()
        .with(eq("leg-a"))
        .times(1)
        .returning(|_| Ok(()));
    let config = DialerConfig {
        bridge_timeout_secs: 30,
        ..DialerConfig::default()
    };
    let h = harness_with(telephony, config);

    let request = h.dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap();

    let not_yet = h.dialer.bridges.expire_stale(Utc::now()).await.unwrap();
    assert!(not_yet.is_empty());

    // Answer reported after the deadline is not bridged
    let mut late = answered("leg-a", Some(&request.correlation_token));
    late.occurred_at = request.expires_at + ChronoDuration::seconds(1);
    h.dialer.webhooks.process(&late).await.unwrap();

    let expired = h
        .dialer
        .bridges
        .expire_stale(request.expires_at + ChronoDuration::seconds(1))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].status, BridgeStatus::Expired);

    let purged = h
        .dialer
        .bridges
        .purge_finished(Utc::now() + ChronoDuration::hours(2))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert_eq!(h.store.bridge_count(), 0);
}

#[tokio::test]
async fn test_answer_inside_window_survives_timeout_sweep() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    telephony
        .expect_dial()
        .withf(|req: &DialRequest| req.to.as_str() == PROSPECT)
        .times(1)
        .returning(|_| Ok("leg-b".to_string()));
    telephony
        .expect_bridge()
        .with(eq("leg-a"), eq("leg-b"))
        .times(1)
        .returning(|_, _| Ok(()));
    telephony.expect_hangup().never();
    let h = harness(telephony);

    let request = h.dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap();

    // The sweep runs before the worker gets to the answer
    let swept = h
        .dialer
        .bridges
        .expire_stale(request.expires_at + ChronoDuration::seconds(1))
        .await
        .unwrap();
    assert_eq!(swept.len(), 1);

    let mut answer = answered("leg-a", Some(&request.correlation_token));
    answer.occurred_at = request.created_at + ChronoDuration::seconds(10);
    h.dialer.webhooks.process(&answer).await.unwrap();

    let bridged = h.dialer.bridges.get(request.id).await.unwrap();
    assert_eq!(bridged.status, BridgeStatus::Bridged);
    assert!(bridged.consumed);
    assert_eq!(bridged.leg_b_call_id.as_deref(), Some("leg-b"));
}

/// Leg store that refuses every new leg
struct RejectingLegs(Arc<MemoryStore>);

#[async_trait]
impl CallLegRepository for RejectingLegs {
    async fn insert(&self, _leg: &CallLeg) -> AppResult<CallLeg> {
        Err(AppError::Database("connection reset".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallLeg>> {
        CallLegRepository::find_by_id(&*self.0, id).await
    }

    async fn find_by_provider_id(&self, provider_call_id: &str) -> AppResult<Option<CallLeg>> {
        CallLegRepository::find_by_provider_id(&*self.0, provider_call_id).await
    }

    async fn find_by_queue_item(&self, item_id: Uuid) -> AppResult<Option<CallLeg>> {
        CallLegRepository::find_by_queue_item(&*self.0, item_id).await
    }

    async fn list_for_session(&self, session_id: Uuid) -> AppResult<Vec<CallLeg>> {
        CallLegRepository::list_for_session(&*self.0, session_id).await
    }

    async fn advance(
        &self,
        provider_call_id: &str,
        change: &StatusChange,
    ) -> AppResult<Option<CallLeg>> {
        CallLegRepository::advance(&*self.0, provider_call_id, change).await
    }

    async fn attach_metadata(
        &self,
        provider_call_id: &str,
        metadata: &LegMetadata,
    ) -> AppResult<Option<CallLeg>> {
        CallLegRepository::attach_metadata(&*self.0, provider_call_id, metadata).await
    }

    async fn set_disposition(
        &self,
        id: Uuid,
        disposition: Disposition,
        notes: Option<&str>,
    ) -> AppResult<CallLeg> {
        CallLegRepository::set_disposition(&*self.0, id, disposition, notes).await
    }
}

#[tokio::test]
async fn test_unrecorded_leg_a_is_hung_up() {
    let mut telephony = MockTelephony::new();
    expect_leg_a(&mut telephony);
    telephony
        .expect_hangup()
        .with(eq("leg-a"))
        .times(1)
        .returning(|_| Ok(()));

    let store = Arc::new(MemoryStore::new());
    let mut repos = store.repositories();
    repos.legs = Arc::new(RejectingLegs(store.clone()));
    let dialer = Dialer::new(repos, Arc::new(telephony), DialerConfig::default());
    let mut feed = dialer.bus.subscribe();

    let err = dialer.bridges.request_bridge(trigger(PROSPECT)).await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    let request = dialer.bridges.find_by_leg_a("leg-a").await.unwrap();
    assert_eq!(request.status, BridgeStatus::Failed);
    assert!(request.failure_reason.is_some());

    match feed.try_recv().unwrap() {
        DialerEvent::BridgeUpdated(published) => {
            assert_eq!(published.id, request.id);
            assert_eq!(published.status, BridgeStatus::Failed);
        }
        other => panic!("unexpected event {:?}", other),
    }
}
