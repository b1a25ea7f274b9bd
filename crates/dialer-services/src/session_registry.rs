//! Session registry
//!
//! A dial session is the sole owner of "what is being dialed right now": the
//! current item is whatever queue item of the session is DIALING, and the leg
//! is the latest leg originated for that item.

use crate::bus::{DialerEvent, EventBus};
use crate::call_leg_tracker::{CallLegTracker, OriginateRequest};
use crate::queue_store::QueueStore;
use dialer_core::{
    models::{CallLeg, DialSession, EnqueueResult, QueueItem, SessionStatus},
    traits::{ContactDirectory, SessionRepository},
    AppError, AppResult, PhoneNumber,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of advancing a session
#[derive(Debug, Clone)]
pub enum Advance {
    /// Item moved to DIALING
    Next(QueueItem),
    /// Nothing left to dial; the session has been ended
    SessionComplete,
}

/// Result of `dial_next`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DialOutcome {
    Dialing { item: QueueItem, leg: CallLeg },
    SessionComplete,
}

/// Session with its live pointers resolved
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: DialSession,
    pub current_item: Option<QueueItem>,
    pub current_leg: Option<CallLeg>,
}

/// A freshly started session and the outcome of its initial enqueue
#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session: DialSession,
    pub enqueued: EnqueueResult,
}

pub struct SessionRegistry {
    sessions: Arc<dyn SessionRepository>,
    contacts: Arc<dyn ContactDirectory>,
    queue: Arc<QueueStore>,
    tracker: Arc<CallLegTracker>,
    bus: EventBus,
    max_attempts: i32,
}

impl SessionRegistry {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        contacts: Arc<dyn ContactDirectory>,
        queue: Arc<QueueStore>,
        tracker: Arc<CallLegTracker>,
        bus: EventBus,
        max_attempts: i32,
    ) -> Self {
        Self {
            sessions,
            contacts,
            queue,
            tracker,
            bus,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Open an ACTIVE session for an operator and queue its contacts
    #[instrument(skip(self, contact_ids))]
    pub async fn start(
        &self,
        owner_id: &str,
        caller_id_number: &str,
        contact_ids: &[i64],
        priority: Option<i32>,
    ) -> AppResult<StartedSession> {
        let caller_id = PhoneNumber::parse(caller_id_number)?;

        let session = self
            .sessions
            .create(&DialSession::new(owner_id, caller_id.as_str()))
            .await?;
        info!("Session {} started for {}", session.id, owner_id);

        let enqueued = if contact_ids.is_empty() {
            EnqueueResult::default()
        } else {
            self.queue.enqueue(session.id, contact_ids, priority).await?
        };

        let session = self.require(session.id).await?;
        self.bus.publish(DialerEvent::SessionUpdated(session.clone()));

        Ok(StartedSession { session, enqueued })
    }

    pub async fn pause(&self, id: Uuid) -> AppResult<DialSession> {
        self.set_status(id, &[SessionStatus::Active], SessionStatus::Paused)
            .await
    }

    pub async fn resume(&self, id: Uuid) -> AppResult<DialSession> {
        self.set_status(id, &[SessionStatus::Paused], SessionStatus::Active)
            .await
    }

    /// End the session; a call in progress finishes on its own
    pub async fn stop(&self, id: Uuid) -> AppResult<DialSession> {
        self.set_status(
            id,
            &[SessionStatus::Active, SessionStatus::Paused],
            SessionStatus::Ended,
        )
        .await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<SessionView> {
        let session = self.require(id).await?;
        self.view(session).await
    }

    /// The operator's open session, if any
    pub async fn active_for(&self, owner_id: &str) -> AppResult<Option<SessionView>> {
        match self.sessions.find_open_for_owner(owner_id).await? {
            Some(session) => Ok(Some(self.view(session).await?)),
            None => Ok(None),
        }
    }

    /// Move the next queued contact to DIALING
    ///
    /// An exhausted queue ends the session.
    #[instrument(skip(self))]
    pub async fn advance(&self, id: Uuid) -> AppResult<Advance> {
        let session = self.require(id).await?;
        if session.status != SessionStatus::Active {
            return Err(AppError::InvalidSessionState(format!(
                "session {} is {}",
                id, session.status
            )));
        }

        match self.queue.dequeue_next(id).await {
            Ok(item) => Ok(Advance::Next(item)),
            Err(AppError::EmptyQueue(_)) => {
                if let Some(ended) = self
                    .sessions
                    .update_status(id, &[SessionStatus::Active], SessionStatus::Ended)
                    .await?
                {
                    info!("Session {} complete, queue exhausted", id);
                    self.bus.publish(DialerEvent::SessionUpdated(ended));
                }
                Ok(Advance::SessionComplete)
            }
            Err(e) => Err(e),
        }
    }

    /// Advance and originate a call to the next dialable contact
    ///
    /// Contacts without a usable number are failed and skipped over. When the
    /// provider rejects the dial the item goes back in line, or is failed once
    /// it has used up its attempts, and the error is returned.
    #[instrument(skip(self))]
    pub async fn dial_next(&self, id: Uuid) -> AppResult<DialOutcome> {
        loop {
            let item = match self.advance(id).await? {
                Advance::Next(item) => item,
                Advance::SessionComplete => return Ok(DialOutcome::SessionComplete),
            };
            let session = self.require(id).await?;

            let contact = match self.contacts.find_by_id(item.contact_id).await {
                Ok(contact) => contact,
                Err(e) => {
                    self.queue.requeue(item.id).await?;
                    return Err(e);
                }
            };
            let target = contact
                .as_ref()
                .and_then(|c| c.phone.as_deref())
                .and_then(|phone| PhoneNumber::parse(phone).ok());
            let (contact, to) = match (contact, target) {
                (Some(contact), Some(to)) => (contact, to),
                _ => {
                    warn!("Contact {} has no dialable number", item.contact_id);
                    self.queue.fail(item.id).await?;
                    continue;
                }
            };

            let request = OriginateRequest {
                to,
                from: PhoneNumber::parse(&session.caller_id_number)?,
                session_id: Some(id),
                queue_item_id: Some(item.id),
                contact_id: Some(contact.id),
                contact_name: Some(contact.display_name),
                operator_id: Some(session.owner_id.clone()),
            };

            return match self.tracker.originate(request).await {
                Ok(leg) => {
                    info!("Dialing contact {} on leg {}", item.contact_id, leg.provider_call_id);
                    let item = self.queue.get(item.id).await?;
                    self.publish_session(id).await;
                    Ok(DialOutcome::Dialing { item, leg })
                }
                Err(e) => {
                    if item.attempts >= self.max_attempts {
                        warn!(
                            "Giving up on contact {} after {} attempts: {}",
                            item.contact_id, item.attempts, e
                        );
                        self.queue.fail(item.id).await?;
                    } else {
                        warn!("Origination failed for contact {}: {}", item.contact_id, e);
                        self.queue.requeue(item.id).await?;
                    }
                    Err(e)
                }
            };
        }
    }

    async fn set_status(
        &self,
        id: Uuid,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> AppResult<DialSession> {
        match self.sessions.update_status(id, from, to).await? {
            Some(session) => {
                info!("Session {} -> {}", id, to);
                self.bus.publish(DialerEvent::SessionUpdated(session.clone()));
                Ok(session)
            }
            None => {
                let current = self.require(id).await?;
                Err(AppError::InvalidSessionState(format!(
                    "session {} is {}, cannot become {}",
                    id, current.status, to
                )))
            }
        }
    }

    async fn publish_session(&self, id: Uuid) {
        if let Ok(session) = self.require(id).await {
            self.bus.publish(DialerEvent::SessionUpdated(session));
        }
    }

    async fn require(&self, id: Uuid) -> AppResult<DialSession> {
        self.sessions
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {}", id)))
    }

    async fn view(&self, session: DialSession) -> AppResult<SessionView> {
        let current_item = match session.current_item_id {
            Some(item_id) => self.queue.get(item_id).await.ok(),
            None => None,
        };
        let current_leg = match &current_item {
            Some(item) => self.tracker.find_by_queue_item(item.id).await?,
            None => None,
        };

        Ok(SessionView {
            session,
            current_item,
            current_leg,
        })
    }
}
