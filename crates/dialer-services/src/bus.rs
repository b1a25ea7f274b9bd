//! Live event bus
//!
//! Every state change the engine makes is published here. UI clients follow
//! the feed over `/ws`; nothing in the engine depends on anyone listening.

use dialer_core::models::{BridgeRequest, CallLeg, DialSession, QueueItem};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Default number of buffered events per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// State change published to live subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DialerEvent {
    SessionUpdated(DialSession),
    QueueItemUpdated(QueueItem),
    LegUpdated(CallLeg),
    BridgeUpdated(BridgeRequest),
    /// Leg B could not be originated or bridged; the operator is still on leg A
    BridgeLegFailed {
        bridge_id: Uuid,
        operator_id: String,
        reason: String,
    },
}

impl DialerEvent {
    /// Operator the event concerns, when it is known
    pub fn operator_id(&self) -> Option<&str> {
        match self {
            DialerEvent::SessionUpdated(s) => Some(&s.owner_id),
            DialerEvent::QueueItemUpdated(_) => None,
            DialerEvent::LegUpdated(leg) => leg.operator_id.as_deref(),
            DialerEvent::BridgeUpdated(b) => Some(&b.operator_id),
            DialerEvent::BridgeLegFailed { operator_id, .. } => Some(operator_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DialerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; dropped silently when nobody is subscribed
    pub fn publish(&self, event: DialerEvent) {
        if self.sender.send(event).is_err() {
            trace!("No live subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DialerEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
