//! Webhook event processor
//!
//! Ingress only persists the event and hands it to a bounded channel, so the
//! provider gets its 200 as soon as the event is durable. A single worker
//! drains the channel and applies events through the leg tracker and the
//! bridge correlator. Processing failures are logged and absorbed; events
//! still unprocessed at shutdown are replayed on the next start.

use crate::bridge_correlator::BridgeCorrelator;
use crate::call_leg_tracker::{ApplyOutcome, CallLegTracker};
use dialer_core::{
    models::{CallEvent, CallEventKind},
    traits::WebhookEventRepository,
    AppResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Max events replayed at start-up
const REPLAY_BATCH: i64 = 1000;

/// Event waiting in the processing channel
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub event: CallEvent,
    /// Retries already spent waiting for the leg to appear
    pub attempt: u32,
}

pub type WebhookReceiver = mpsc::Receiver<QueuedEvent>;

/// Ingress result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// Event id already recorded
    Duplicate,
}

/// Result of processing one event
#[derive(Debug, Clone)]
pub enum Processed {
    Applied(ApplyOutcome),
    /// No leg yet; the event should be retried
    LegNotFound,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

pub struct WebhookProcessor {
    events: Arc<dyn WebhookEventRepository>,
    tracker: Arc<CallLegTracker>,
    correlator: Arc<BridgeCorrelator>,
    sender: mpsc::Sender<QueuedEvent>,
    retry: RetryPolicy,
}

impl WebhookProcessor {
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        tracker: Arc<CallLegTracker>,
        correlator: Arc<BridgeCorrelator>,
        capacity: usize,
        retry: RetryPolicy,
    ) -> (Self, WebhookReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                events,
                tracker,
                correlator,
                sender,
                retry,
            },
            receiver,
        )
    }

    /// Persist an incoming event and queue it for processing
    #[instrument(skip(self, event), fields(event_id = %event.event_id, event = event.kind.name()))]
    pub async fn submit(&self, event: CallEvent) -> AppResult<Submission> {
        if !self.events.record(&event).await? {
            debug!("Event {} already received", event.event_id);
            return Ok(Submission::Duplicate);
        }

        self.enqueue(QueuedEvent { event, attempt: 0 });
        Ok(Submission::Accepted)
    }

    /// Re-queue events persisted but never processed
    pub async fn replay_pending(&self) -> AppResult<usize> {
        let pending = self.events.find_unprocessed(REPLAY_BATCH).await?;
        let count = pending.len();
        for event in pending {
            self.enqueue(QueuedEvent { event, attempt: 0 });
        }
        if count > 0 {
            info!("Replaying {} unprocessed webhook events", count);
        }
        Ok(count)
    }

    /// Worker loop draining the processing channel
    pub async fn run(self: Arc<Self>, mut receiver: WebhookReceiver) {
        info!("Webhook worker started");
        while let Some(queued) = receiver.recv().await {
            self.handle(queued).await;
        }
        info!("Webhook worker stopped");
    }

    /// Process one queued event, scheduling a retry when its leg is missing
    pub async fn handle(&self, queued: QueuedEvent) {
        let event_id = queued.event.event_id.clone();

        match self.process(&queued.event).await {
            Ok(Processed::Applied(_)) => {}
            Ok(Processed::LegNotFound) if queued.attempt < self.retry.attempts => {
                debug!(
                    "Leg {} not found for event {}, retry {}/{}",
                    queued.event.call_control_id,
                    event_id,
                    queued.attempt + 1,
                    self.retry.attempts
                );
                let sender = self.sender.clone();
                let delay = self.retry.delay;
                let retry = QueuedEvent {
                    event: queued.event,
                    attempt: queued.attempt + 1,
                };
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if sender.send(retry).await.is_err() {
                        warn!("Webhook worker gone, retry dropped");
                    }
                });
            }
            Ok(Processed::LegNotFound) => {
                warn!(
                    "Dropping {} for unknown leg {} after {} retries",
                    queued.event.kind.name(),
                    queued.event.call_control_id,
                    queued.attempt
                );
                self.mark_processed(&event_id).await;
            }
            Err(e) => {
                error!("Failed to process webhook event {}: {}", event_id, e);
            }
        }
    }

    /// Apply one event and run its bridge side effects
    #[instrument(skip(self, event), fields(event_id = %event.event_id, event = event.kind.name()))]
    pub async fn process(&self, event: &CallEvent) -> AppResult<Processed> {
        let outcome = self.tracker.apply(event).await?;
        if matches!(outcome, ApplyOutcome::UnknownLeg) {
            return Ok(Processed::LegNotFound);
        }

        // Bridge steps are idempotent, so replays run them again safely
        match &event.kind {
            CallEventKind::Answered => {
                if let Err(e) = self.correlator.on_answered(event).await {
                    warn!("Bridge handling failed for {}: {}", event.call_control_id, e);
                }
            }
            CallEventKind::Hangup { .. } => {
                if let Err(e) = self.correlator.on_leg_terminated(&event.call_control_id).await {
                    warn!("Bridge expiry failed for {}: {}", event.call_control_id, e);
                }
            }
            _ => {}
        }

        self.mark_processed(&event.event_id).await;
        Ok(Processed::Applied(outcome))
    }

    fn enqueue(&self, queued: QueuedEvent) {
        match self.sender.try_send(queued) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(queued)) => {
                warn!("Webhook queue full, deferring event {}", queued.event.event_id);
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send(queued).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(queued)) => {
                warn!(
                    "Webhook worker not running, event {} left for replay",
                    queued.event.event_id
                );
            }
        }
    }

    async fn mark_processed(&self, event_id: &str) {
        if let Err(e) = self.events.mark_processed(event_id).await {
            warn!("Failed to mark event {} processed: {}", event_id, e);
        }
    }
}
