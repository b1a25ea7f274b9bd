//! Call-control engine for the prospect dialer
//!
//! This crate turns queued contacts into live calls and follows them through
//! the provider's asynchronous webhook stream.
//!
//! # Architecture
//!
//! Components are plain structs over the repository traits of `dialer-core`,
//! shared behind `Arc` and instrumented with tracing:
//!
//! - `QueueStore` - prioritized dial targets per session
//! - `SessionRegistry` - one active session per operator, advances the queue
//! - `CallLegTracker` - forward-only leg state machine keyed by provider call id
//! - `BridgeCorrelator` - two-leg click-to-call via the operator's cell
//! - `WebhookProcessor` - durable ingress and the event worker
//! - `DispositionRecorder` - call outcomes and queue advancement
//!
//! `Dialer` wires them together; `EventBus` publishes every change live.

pub mod bridge_correlator;
pub mod bus;
pub mod call_leg_tracker;
pub mod dialer;
pub mod disposition_recorder;
pub mod maintenance;
pub mod queue_store;
pub mod session_registry;
pub mod webhook_processor;

pub use bridge_correlator::{BridgeCorrelator, BridgeTrigger};
pub use bus::{DialerEvent, EventBus};
pub use call_leg_tracker::{ApplyOutcome, CallLegTracker, OriginateRequest};
pub use dialer::Dialer;
pub use disposition_recorder::{DispositionRecorder, DispositionResult};
pub use maintenance::spawn_bridge_maintenance;
pub use queue_store::QueueStore;
pub use session_registry::{Advance, DialOutcome, SessionRegistry, SessionView, StartedSession};
pub use webhook_processor::{
    Processed, QueuedEvent, RetryPolicy, Submission, WebhookProcessor, WebhookReceiver,
};
