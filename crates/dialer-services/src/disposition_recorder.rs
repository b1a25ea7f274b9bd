//! Disposition recorder
//!
//! Closes a finished call: records the outcome on the leg, completes the
//! session's queue item and dials the next contact.

use crate::call_leg_tracker::CallLegTracker;
use crate::queue_store::QueueStore;
use crate::session_registry::{DialOutcome, SessionRegistry};
use dialer_core::{
    models::{CallLeg, CallLegStatus, Disposition, QueueItem, QueueItemStatus, QueueOutcome},
    AppError, AppResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct DispositionResult {
    pub leg: CallLeg,
    /// The session item, when the leg was dialed from a queue
    pub queue_item: Option<QueueItem>,
    /// What the session moved on to
    pub next: Option<DialOutcome>,
    /// Why dialing the next contact failed; the disposition itself stands
    pub advance_error: Option<String>,
}

pub struct DispositionRecorder {
    tracker: Arc<CallLegTracker>,
    queue: Arc<QueueStore>,
    sessions: Arc<SessionRegistry>,
}

impl DispositionRecorder {
    pub fn new(
        tracker: Arc<CallLegTracker>,
        queue: Arc<QueueStore>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            tracker,
            queue,
            sessions,
        }
    }

    /// Record the outcome of a finished call
    ///
    /// # Errors
    ///
    /// `InvalidLegState` unless the leg has hung up.
    #[instrument(skip(self, notes))]
    pub async fn set_disposition(
        &self,
        leg_id: Uuid,
        outcome: Disposition,
        notes: Option<&str>,
    ) -> AppResult<DispositionResult> {
        let leg = self.tracker.get(leg_id).await?;
        if leg.status != CallLegStatus::Hangup {
            return Err(AppError::InvalidLegState(format!(
                "call {} is {}, dispositions need a finished call",
                leg_id, leg.status
            )));
        }

        let leg = self.tracker.set_disposition(leg_id, outcome, notes).await?;
        info!("Call {} dispositioned as {}", leg_id, outcome);

        let mut result = DispositionResult {
            leg,
            queue_item: None,
            next: None,
            advance_error: None,
        };

        let item_id = match result.leg.queue_item_id {
            Some(item_id) => item_id,
            None => return Ok(result),
        };

        let item = self.queue.get(item_id).await?;
        if item.status != QueueItemStatus::Dialing {
            // Re-disposition of an item closed earlier
            result.queue_item = Some(item);
            return Ok(result);
        }

        let item = self
            .queue
            .complete(item_id, QueueOutcome::new(outcome, result.leg.was_answered()))
            .await?;
        let session_id = item.session_id;
        result.queue_item = Some(item);

        let session = self.sessions.get(session_id).await?;
        if !session.session.is_active() {
            return Ok(result);
        }

        match self.sessions.dial_next(session_id).await {
            Ok(next) => result.next = Some(next),
            Err(e) => {
                warn!("Could not dial next contact in session {}: {}", session_id, e);
                result.advance_error = Some(e.to_string());
            }
        }

        Ok(result)
    }
}
