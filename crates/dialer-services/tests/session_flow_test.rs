//! Queue, session and disposition flow


use dialer_core::models::{
    CallLegStatus, Disposition, ItemPatch, QueueItemStatus, SessionStatus,
};
use dialer_core::traits::DialRequest;
use dialer_core::AppError;
use dialer_services::{Advance, DialOutcome};
use harness::{answered, call_id_for, harness, hangup, MockTelephony, CALLER_ID, OPERATOR};

fn dialing_telephony(times: usize) -> MockTelephony {
    let mut telephony = MockTelephony::new();
    telephony
        .expect_dial()
        .times(times)
        .returning(|req: &DialRequest| Ok(call_id_for(req)));
    telephony
}

#[tokio::test]
async fn test_happy_path_dials_by_priority_and_advances() {
    let h = harness(dialing_telephony(2));
    h.store.add_contact(1, "Alice", Some("+15550000001"));
    h.store.add_contact(2, "Bob", Some("+15550000002"));

    let started = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[], None)
        .await
        .unwrap();
    let session_id = started.session.id;
    h.dialer.queue.enqueue(session_id, &[1], Some(5)).await.unwrap();
    h.dialer.queue.enqueue(session_id, &[2], Some(1)).await.unwrap();

    let (item, leg) = match h.dialer.sessions.dial_next(session_id).await.unwrap() {
        DialOutcome::Dialing { item, leg } => (item, leg),
        other => panic!("expected a call, got {:?}", other),
    };
    assert_eq!(item.contact_id, 1);
    assert_eq!(leg.status, CallLegStatus::Initiated);
    assert_eq!(leg.to_number, "+15550000001");
    assert_eq!(leg.from_number, CALLER_ID);
    assert_eq!(leg.contact_name.as_deref(), Some("Alice"));

    let view = h.dialer.sessions.get(session_id).await.unwrap();
    assert_eq!(view.current_item.as_ref().map(|i| i.id), Some(item.id));
    assert_eq!(view.current_leg.as_ref().map(|l| l.id), Some(leg.id));

    h.dialer
        .webhooks
        .process(&answered(&leg.provider_call_id, None))
        .await
        .unwrap();
    assert_eq!(
        h.dialer.tracker.get(leg.id).await.unwrap().status,
        CallLegStatus::Answered
    );

    h.dialer
        .webhooks
        .process(&hangup(&leg.provider_call_id, 42, None))
        .await
        .unwrap();

    let result = h
        .dialer
        .dispositions
        .set_disposition(leg.id, Disposition::Interested, Some("wants a call back"))
        .await
        .unwrap();

    let completed = result.queue_item.unwrap();
    assert_eq!(completed.status, QueueItemStatus::Completed);
    assert!(completed.was_answered);
    assert!(completed.was_contacted);
    assert_eq!(result.leg.notes.as_deref(), Some("wants a call back"));

    match result.next {
        Some(DialOutcome::Dialing { item, .. }) => assert_eq!(item.contact_id, 2),
        other => panic!("expected Bob to be dialed next, got {:?}", other),
    }
    assert_eq!(h.store.dialing_count(session_id), 1);
}

#[tokio::test]
async fn test_only_one_item_dials_at_a_time() {
    let h = harness(dialing_telephony(1));
    h.store.add_contact(1, "Alice", Some("+15550000001"));
    h.store.add_contact(2, "Bob", Some("+15550000002"));

    let session_id = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1, 2], None)
        .await
        .unwrap()
        .session
        .id;

    h.dialer.sessions.dial_next(session_id).await.unwrap();
    let err = h.dialer.sessions.dial_next(session_id).await.unwrap_err();
    assert!(matches!(err, AppError::DialInProgress(_)));
    assert_eq!(h.store.dialing_count(session_id), 1);
}

#[tokio::test]
async fn test_concurrent_dequeues_yield_single_dialing_item() {
    let h = harness(MockTelephony::new());
    let session_id = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1, 2, 3], None)
        .await
        .unwrap()
        .session
        .id;

    let (a, b) = tokio::join!(
        h.dialer.queue.dequeue_next(session_id),
        h.dialer.queue.dequeue_next(session_id)
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(h.store.dialing_count(session_id), 1);
}

#[tokio::test]
async fn test_exhausted_queue_completes_session() {
    let h = harness(MockTelephony::new());
    let session_id = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[], None)
        .await
        .unwrap()
        .session
        .id;

    let advance = h.dialer.sessions.advance(session_id).await.unwrap();
    assert!(matches!(advance, Advance::SessionComplete));

    let view = h.dialer.sessions.get(session_id).await.unwrap();
    assert_eq!(view.session.status, SessionStatus::Ended);
    assert!(h.dialer.sessions.active_for(OPERATOR).await.unwrap().is_none());
}

#[tokio::test]
async fn test_paused_session_cannot_advance() {
    let h = harness(MockTelephony::new());
    let session_id = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1], None)
        .await
        .unwrap()
        .session
        .id;

    h.dialer.sessions.pause(session_id).await.unwrap();
    let err = h.dialer.sessions.advance(session_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidSessionState(_)));

    // Queue position survives the pause
    let resumed = h.dialer.sessions.resume(session_id).await.unwrap();
    assert_eq!(resumed.status, SessionStatus::Active);
    match h.dialer.sessions.advance(session_id).await.unwrap() {
        Advance::Next(item) => assert_eq!(item.contact_id, 1),
        other => panic!("unexpected {:?}", other),
    }

    let err = h.dialer.sessions.resume(session_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidSessionState(_)));
}

#[tokio::test]
async fn test_one_open_session_per_operator() {
    let h = harness(MockTelephony::new());
    h.dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1], None)
        .await
        .unwrap();

    let err = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[2], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SessionAlreadyActive(_)));
}

#[tokio::test]
async fn test_invalid_caller_id_is_rejected() {
    let h = harness(MockTelephony::new());
    let err = h
        .dialer
        .sessions
        .start(OPERATOR, "not-a-number", &[1], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidNumber(_)));
}

#[tokio::test]
async fn test_failed_origination_requeues_then_fails_item() {
    let mut telephony = MockTelephony::new();
    telephony
        .expect_dial()
        .times(3)
        .returning(|_| Err(AppError::Provider("503 Service Unavailable".to_string())));
    let h = harness(telephony);
    h.store.add_contact(1, "Alice", Some("+15550000001"));

    let session_id = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1], None)
        .await
        .unwrap()
        .session
        .id;

    for _ in 0..2 {
        let err = h.dialer.sessions.dial_next(session_id).await.unwrap_err();
        assert!(matches!(err, AppError::Provider(_)));
        let items = h.dialer.queue.list(session_id).await.unwrap();
        assert_eq!(items[0].status, QueueItemStatus::Pending);
    }

    h.dialer.sessions.dial_next(session_id).await.unwrap_err();
    let items = h.dialer.queue.list(session_id).await.unwrap();
    assert_eq!(items[0].status, QueueItemStatus::Failed);
    assert_eq!(items[0].attempts, 3);

    let next = h.dialer.sessions.dial_next(session_id).await.unwrap();
    assert!(matches!(next, DialOutcome::SessionComplete));
}

#[tokio::test]
async fn test_contact_without_number_is_skipped_over() {
    let h = harness(dialing_telephony(1));
    h.store.add_contact(1, "No Phone", None);
    h.store.add_contact(2, "Bob", Some("(555) 000-0002"));

    let session_id = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1], Some(10))
        .await
        .unwrap()
        .session
        .id;
    h.dialer.queue.enqueue(session_id, &[2], Some(1)).await.unwrap();

    match h.dialer.sessions.dial_next(session_id).await.unwrap() {
        DialOutcome::Dialing { item, leg } => {
            assert_eq!(item.contact_id, 2);
            assert_eq!(leg.to_number, "+15550000002");
        }
        other => panic!("unexpected {:?}", other),
    }

    let items = h.dialer.queue.list(session_id).await.unwrap();
    let skipped = items.iter().find(|i| i.contact_id == 1).unwrap();
    assert_eq!(skipped.status, QueueItemStatus::Failed);
}

#[tokio::test]
async fn test_disposition_requires_finished_call() {
    let h = harness(dialing_telephony(1));
    h.store.add_contact(1, "Alice", Some("+15550000001"));
    let session_id = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1], None)
        .await
        .unwrap()
        .session
        .id;

    let leg = match h.dialer.sessions.dial_next(session_id).await.unwrap() {
        DialOutcome::Dialing { leg, .. } => leg,
        other => panic!("unexpected {:?}", other),
    };

    let err = h
        .dialer
        .dispositions
        .set_disposition(leg.id, Disposition::NoAnswer, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidLegState(_)));
}

#[tokio::test]
async fn test_stopped_session_does_not_dial_after_disposition() {
    let h = harness(dialing_telephony(1));
    h.store.add_contact(1, "Alice", Some("+15550000001"));
    h.store.add_contact(2, "Bob", Some("+15550000002"));
    let session_id = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1, 2], None)
        .await
        .unwrap()
        .session
        .id;

    let leg = match h.dialer.sessions.dial_next(session_id).await.unwrap() {
        DialOutcome::Dialing { leg, .. } => leg,
        other => panic!("unexpected {:?}", other),
    };
    h.dialer.sessions.stop(session_id).await.unwrap();

    h.dialer
        .webhooks
        .process(&hangup(&leg.provider_call_id, 0, None))
        .await
        .unwrap();
    let result = h
        .dialer
        .dispositions
        .set_disposition(leg.id, Disposition::NoAnswer, None)
        .await
        .unwrap();

    let item = result.queue_item.unwrap();
    assert_eq!(item.status, QueueItemStatus::Completed);
    assert!(!item.was_answered);
    assert!(!item.was_contacted);
    assert!(result.next.is_none());
}

#[tokio::test]
async fn test_queue_item_patch_rules() {
    let h = harness(MockTelephony::new());
    let session_id = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1, 2], None)
        .await
        .unwrap()
        .session
        .id;
    let items = h.dialer.queue.list(session_id).await.unwrap();
    let first = items[0].id;

    let skipped = h
        .dialer
        .queue
        .update_item(
            first,
            ItemPatch {
                priority: None,
                status: Some(QueueItemStatus::Skipped),
            },
        )
        .await
        .unwrap();
    assert_eq!(skipped.status, QueueItemStatus::Skipped);

    let restored = h
        .dialer
        .queue
        .update_item(
            first,
            ItemPatch {
                priority: Some(99),
                status: Some(QueueItemStatus::Pending),
            },
        )
        .await
        .unwrap();
    assert_eq!(restored.status, QueueItemStatus::Pending);
    assert_eq!(restored.priority, 99);

    let err = h
        .dialer
        .queue
        .update_item(
            first,
            ItemPatch {
                priority: None,
                status: Some(QueueItemStatus::Completed),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidItemState(_)));
}

#[tokio::test]
async fn test_enqueue_reports_rejected_contacts() {
    let h = harness(MockTelephony::new());
    let started = h
        .dialer
        .sessions
        .start(OPERATOR, CALLER_ID, &[1, 2], None)
        .await
        .unwrap();
    assert_eq!(started.enqueued.added.len(), 2);

    let again = h
        .dialer
        .queue
        .enqueue(started.session.id, &[2, 3], None)
        .await
        .unwrap();
    assert_eq!(again.rejected, vec![2]);
    assert_eq!(again.added.len(), 1);
    assert!(again.added[0].priority > started.enqueued.added[0].priority);

    let removed = h
        .dialer
        .queue
        .remove(started.session.id, &[1, 3])
        .await
        .unwrap();
    assert_eq!(removed, 2);
}
