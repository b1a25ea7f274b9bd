//! Call leg tracker
//!
//! Owns the leg state machine. Every provider event goes through [`apply`],
//! which looks the leg up by provider call id and performs a conditional,
//! forward-only update. A replayed or stale event finds no eligible row and
//! comes back as [`ApplyOutcome::Duplicate`].
//!
//! [`apply`]: CallLegTracker::apply

use crate::bus::{DialerEvent, EventBus};
use chrono::Utc;
use dialer_core::{
    models::{
        CallDirection, CallEvent, CallEventKind, CallLeg, CallLegStatus, Disposition, LedgerEntry,
    },
    traits::{
        BillingLedger, CallLegRepository, ContactDirectory, DialRequest, PhoneNumberInventory,
        TelephonyProvider,
    },
    AppError, AppResult, PhoneNumber,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Result of applying one provider event
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// The leg changed
    Applied(CallLeg),
    /// Already applied, or stale; the leg is unchanged
    Duplicate(CallLeg),
    /// No leg with this provider call id exists yet
    UnknownLeg,
}

/// Parameters for an outbound leg
#[derive(Debug, Clone)]
pub struct OriginateRequest {
    pub to: PhoneNumber,
    pub from: PhoneNumber,
    pub session_id: Option<Uuid>,
    pub queue_item_id: Option<Uuid>,
    pub contact_id: Option<i64>,
    pub contact_name: Option<String>,
    pub operator_id: Option<String>,
}

pub struct CallLegTracker {
    legs: Arc<dyn CallLegRepository>,
    contacts: Arc<dyn ContactDirectory>,
    ledger: Arc<dyn BillingLedger>,
    inventory: Arc<dyn PhoneNumberInventory>,
    telephony: Arc<dyn TelephonyProvider>,
    bus: EventBus,
}

impl CallLegTracker {
    pub fn new(
        legs: Arc<dyn CallLegRepository>,
        contacts: Arc<dyn ContactDirectory>,
        ledger: Arc<dyn BillingLedger>,
        inventory: Arc<dyn PhoneNumberInventory>,
        telephony: Arc<dyn TelephonyProvider>,
        bus: EventBus,
    ) -> Self {
        Self {
            legs,
            contacts,
            ledger,
            inventory,
            telephony,
            bus,
        }
    }

    /// Dial through the provider and record the leg as INITIATED
    #[instrument(skip(self, request), fields(to = %request.to))]
    pub async fn originate(&self, request: OriginateRequest) -> AppResult<CallLeg> {
        let dial = DialRequest {
            to: request.to.clone(),
            from: request.from.clone(),
            client_state: None,
            timeout_secs: None,
        };
        let provider_call_id = self.telephony.dial(&dial).await?;

        let mut leg = CallLeg::new(
            provider_call_id,
            request.from.as_str(),
            request.to.as_str(),
            CallDirection::Outbound,
        );
        leg.session_id = request.session_id;
        leg.queue_item_id = request.queue_item_id;
        leg.contact_id = request.contact_id;
        leg.contact_name = request.contact_name;
        leg.operator_id = request.operator_id;

        self.register(leg).await
    }

    /// Persist a leg the provider has already accepted
    pub async fn register(&self, mut leg: CallLeg) -> AppResult<CallLeg> {
        if leg.contact_name.is_none() {
            if let Some(contact_id) = leg.contact_id {
                match self.contacts.find_by_id(contact_id).await {
                    Ok(contact) => leg.contact_name = contact.map(|c| c.display_name),
                    Err(e) => warn!("Contact lookup failed for {}: {}", contact_id, e),
                }
            }
        }

        let leg = self.legs.insert(&leg).await?;
        info!(
            "Leg {} created ({} -> {}, {})",
            leg.provider_call_id, leg.from_number, leg.to_number, leg.direction
        );
        self.bus.publish(DialerEvent::LegUpdated(leg.clone()));
        Ok(leg)
    }

    /// Apply one provider event to its leg
    #[instrument(skip(self, event), fields(event = event.kind.name(), call = %event.call_control_id))]
    pub async fn apply(&self, event: &CallEvent) -> AppResult<ApplyOutcome> {
        let provider_call_id = event.call_control_id.as_str();

        let changed = if let Some(change) = event.status_change() {
            self.legs.advance(provider_call_id, &change).await?
        } else if let Some(metadata) = event.metadata() {
            self.legs.attach_metadata(provider_call_id, &metadata).await?
        } else {
            None
        };

        if let Some(leg) = changed {
            info!("Leg {} is {}", leg.provider_call_id, leg.status);
            if leg.status == CallLegStatus::Hangup {
                self.record_usage(&leg).await;
            }
            self.bus.publish(DialerEvent::LegUpdated(leg.clone()));
            return Ok(ApplyOutcome::Applied(leg));
        }

        if let Some(leg) = self.legs.find_by_provider_id(provider_call_id).await? {
            debug!(
                "Ignoring {} for leg {} already {}",
                event.kind.name(),
                provider_call_id,
                leg.status
            );
            return Ok(ApplyOutcome::Duplicate(leg));
        }

        if let CallEventKind::Initiated {
            direction: CallDirection::Inbound,
            from,
            to,
        } = &event.kind
        {
            return self.create_inbound(provider_call_id, from, to).await;
        }

        Ok(ApplyOutcome::UnknownLeg)
    }

    async fn create_inbound(
        &self,
        provider_call_id: &str,
        from: &str,
        to: &str,
    ) -> AppResult<ApplyOutcome> {
        let mut leg = CallLeg::new(provider_call_id, from, to, CallDirection::Inbound);

        let caller = PhoneNumber::parse(from)
            .map(|n| n.as_str().to_string())
            .unwrap_or_else(|_| from.to_string());
        match self.contacts.find_by_phone(&caller).await {
            Ok(Some(contact)) => {
                leg.contact_id = Some(contact.id);
                leg.contact_name = Some(contact.display_name);
            }
            Ok(None) => {}
            Err(e) => warn!("Contact lookup failed for {}: {}", caller, e),
        }

        match self.register(leg).await {
            Ok(leg) => Ok(ApplyOutcome::Applied(leg)),
            // Another delivery of the same event got there first
            Err(AppError::Conflict(_)) => match self.legs.find_by_provider_id(provider_call_id).await? {
                Some(leg) => Ok(ApplyOutcome::Duplicate(leg)),
                None => Ok(ApplyOutcome::UnknownLeg),
            },
            Err(e) => Err(e),
        }
    }

    /// Billing side effects of a completed leg; never blocks the transition
    async fn record_usage(&self, leg: &CallLeg) {
        let number = match leg.direction {
            CallDirection::Outbound => &leg.from_number,
            CallDirection::Inbound => &leg.to_number,
        };

        if let Err(e) = self.inventory.record_usage(number, leg.cost).await {
            warn!("Failed to record usage of {}: {}", number, e);
        }

        let cost = match leg.cost {
            Some(cost) if cost > Decimal::ZERO => cost,
            _ => return,
        };

        let entry = LedgerEntry {
            provider_call_id: leg.provider_call_id.clone(),
            call_leg_id: leg.id,
            phone_number: number.clone(),
            cost,
            recorded_at: Utc::now(),
        };
        match self.ledger.append(&entry).await {
            Ok(true) => info!("Billed {} for leg {}", cost, leg.provider_call_id),
            Ok(false) => debug!("Leg {} already billed", leg.provider_call_id),
            Err(e) => warn!("Billing ledger write failed for {}: {}", leg.provider_call_id, e),
        }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<CallLeg> {
        self.legs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Call leg {}", id)))
    }

    pub async fn find_by_provider_id(&self, provider_call_id: &str) -> AppResult<Option<CallLeg>> {
        self.legs.find_by_provider_id(provider_call_id).await
    }

    pub async fn find_by_queue_item(&self, item_id: Uuid) -> AppResult<Option<CallLeg>> {
        self.legs.find_by_queue_item(item_id).await
    }

    pub async fn list_for_session(&self, session_id: Uuid) -> AppResult<Vec<CallLeg>> {
        self.legs.list_for_session(session_id).await
    }

    /// Record an outcome on a leg
    pub(crate) async fn set_disposition(
        &self,
        id: Uuid,
        disposition: Disposition,
        notes: Option<&str>,
    ) -> AppResult<CallLeg> {
        let leg = self.legs.set_disposition(id, disposition, notes).await?;
        self.bus.publish(DialerEvent::LegUpdated(leg.clone()));
        Ok(leg)
    }
}
