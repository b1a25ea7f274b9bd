//! Domain models for the dialer
//!
//! This module contains all the core domain models used throughout the application.

pub mod bridge;
pub mod call_leg;
pub mod contact;
pub mod disposition;
pub mod event;
pub mod ledger;
pub mod queue;
pub mod session;

pub use bridge::{BridgeRequest, BridgeStatus};
pub use call_leg::{CallDirection, CallLeg, CallLegStatus, HangupDetails, LegMetadata, StatusChange};
pub use contact::{Contact, Operator};
pub use disposition::Disposition;
pub use event::{CallEvent, CallEventKind};
pub use ledger::LedgerEntry;
pub use queue::{EnqueueResult, ItemPatch, QueueItem, QueueItemStatus, QueueOutcome};
pub use session::{DialSession, SessionStatus};
