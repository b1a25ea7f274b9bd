//! Wiring of the engine components

use crate::bridge_correlator::BridgeCorrelator;
use crate::bus::{EventBus, DEFAULT_BUS_CAPACITY};
use crate::call_leg_tracker::CallLegTracker;
use crate::disposition_recorder::DispositionRecorder;
use crate::maintenance::spawn_bridge_maintenance;
use crate::queue_store::QueueStore;
use crate::session_registry::SessionRegistry;
use crate::webhook_processor::{RetryPolicy, WebhookProcessor, WebhookReceiver};
use dialer_core::{
    config::DialerConfig,
    traits::{Repositories, TelephonyProvider},
    AppError, AppResult,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// The assembled call-control engine
pub struct Dialer {
    pub bus: EventBus,
    pub queue: Arc<QueueStore>,
    pub tracker: Arc<CallLegTracker>,
    pub sessions: Arc<SessionRegistry>,
    pub bridges: Arc<BridgeCorrelator>,
    pub webhooks: Arc<WebhookProcessor>,
    pub dispositions: Arc<DispositionRecorder>,
    config: DialerConfig,
    webhook_receiver: Mutex<Option<WebhookReceiver>>,
}

impl Dialer {
    pub fn new(
        repos: Repositories,
        telephony: Arc<dyn TelephonyProvider>,
        config: DialerConfig,
    ) -> Self {
        let bus = EventBus::new(DEFAULT_BUS_CAPACITY);

        let queue = Arc::new(QueueStore::new(repos.queue.clone(), bus.clone()));
        let tracker = Arc::new(CallLegTracker::new(
            repos.legs.clone(),
            repos.contacts.clone(),
            repos.ledger.clone(),
            repos.inventory.clone(),
            telephony.clone(),
            bus.clone(),
        ));
        let sessions = Arc::new(SessionRegistry::new(
            repos.sessions.clone(),
            repos.contacts.clone(),
            queue.clone(),
            tracker.clone(),
            bus.clone(),
            config.max_attempts,
        ));
        let bridges = Arc::new(BridgeCorrelator::new(
            repos.bridges.clone(),
            repos.operators.clone(),
            tracker.clone(),
            telephony,
            bus.clone(),
            config.bridge_timeout(),
        ));
        let (webhooks, receiver) = WebhookProcessor::new(
            repos.webhook_events.clone(),
            tracker.clone(),
            bridges.clone(),
            config.webhook_queue_capacity,
            RetryPolicy {
                attempts: config.webhook_retry_attempts,
                delay: config.webhook_retry_delay(),
            },
        );
        let dispositions = Arc::new(DispositionRecorder::new(
            tracker.clone(),
            queue.clone(),
            sessions.clone(),
        ));

        Self {
            bus,
            queue,
            tracker,
            sessions,
            bridges,
            webhooks: Arc::new(webhooks),
            dispositions,
            config,
            webhook_receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Start the webhook worker and bridge maintenance, then replay any
    /// webhook events left unprocessed by a previous run
    pub async fn start_background(&self) -> AppResult<Vec<JoinHandle<()>>> {
        let receiver = self
            .webhook_receiver
            .lock()
            .take()
            .ok_or_else(|| AppError::Internal("Background tasks already started".to_string()))?;

        let worker = tokio::spawn(self.webhooks.clone().run(receiver));
        let maintenance = spawn_bridge_maintenance(
            self.bridges.clone(),
            self.config.maintenance_interval(),
            self.config.bridge_retention(),
        );

        let replayed = self.webhooks.replay_pending().await?;
        info!("Dialer background tasks running ({} events replayed)", replayed);

        Ok(vec![worker, maintenance])
    }
}
