//! Bridge correlator: click-to-call via the operator's cell
//!
//! Leg A rings the operator's cell carrying a correlation token as client
//! state. When leg A answers, the prospect is dialed as leg B and the two legs
//! are bridged. The `consumed` flag on the bridge request, flipped by a
//! conditional update, guarantees leg B is dialed at most once no matter how
//! many `answered` events arrive for leg A.

use crate::bus::{DialerEvent, EventBus};
use crate::call_leg_tracker::CallLegTracker;
use chrono::{DateTime, Duration, Utc};
use dialer_core::{
    models::{BridgeRequest, BridgeStatus, CallDirection, CallEvent, CallLeg, CallLegStatus},
    traits::{BridgeRepository, DialRequest, OperatorDirectory, TelephonyProvider},
    AppError, AppResult, CorrelationToken, PhoneNumber,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Operator request to call a prospect through their own cell
#[derive(Debug, Clone)]
pub struct BridgeTrigger {
    pub operator_id: String,
    /// Overrides the cell number on file
    pub cell_phone: Option<String>,
    pub lead_phone: String,
    pub from_number: String,
    pub contact_id: Option<i64>,
}

pub struct BridgeCorrelator {
    bridges: Arc<dyn BridgeRepository>,
    operators: Arc<dyn OperatorDirectory>,
    tracker: Arc<CallLegTracker>,
    telephony: Arc<dyn TelephonyProvider>,
    bus: EventBus,
    timeout: std::time::Duration,
}

impl BridgeCorrelator {
    pub fn new(
        bridges: Arc<dyn BridgeRepository>,
        operators: Arc<dyn OperatorDirectory>,
        tracker: Arc<CallLegTracker>,
        telephony: Arc<dyn TelephonyProvider>,
        bus: EventBus,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            bridges,
            operators,
            tracker,
            telephony,
            bus,
            timeout,
        }
    }

    /// Ring the operator's cell (leg A) and remember what to do once it answers
    ///
    /// Every number is validated before the provider is contacted. A provider
    /// rejection surfaces as `BridgeOriginationFailed` and leaves no state.
    /// If the accepted leg A cannot be persisted it is hung up.
    #[instrument(skip(self, trigger), fields(operator = %trigger.operator_id))]
    pub async fn request_bridge(&self, trigger: BridgeTrigger) -> AppResult<BridgeRequest> {
        let prospect = PhoneNumber::parse(&trigger.lead_phone)?;
        let caller_id = PhoneNumber::parse(&trigger.from_number)?;
        let cell = match trigger.cell_phone.as_deref() {
            Some(cell) => PhoneNumber::parse(cell)?,
            None => self.operator_cell(&trigger.operator_id).await?,
        };

        let token = CorrelationToken::new(
            trigger.operator_id.clone(),
            prospect.clone(),
            caller_id.clone(),
            trigger.contact_id,
        );
        let client_state = token.encode()?;

        let leg_a = DialRequest {
            to: cell.clone(),
            from: caller_id.clone(),
            client_state: Some(client_state.clone()),
            timeout_secs: Some(self.timeout.as_secs()),
        };
        let leg_a_call_id = self.telephony.dial(&leg_a).await.map_err(|e| {
            error!("Leg A origination to {} failed: {}", cell, e);
            match e {
                AppError::Provider(msg) => AppError::BridgeOriginationFailed(msg),
                other => other,
            }
        })?;

        let now = Utc::now();
        let request = BridgeRequest {
            id: Uuid::new_v4(),
            operator_id: trigger.operator_id.clone(),
            correlation_token: client_state,
            leg_a_call_id: leg_a_call_id.clone(),
            leg_b_call_id: None,
            target_number: prospect.to_string(),
            source_number: caller_id.to_string(),
            operator_number: cell.to_string(),
            contact_id: trigger.contact_id,
            status: BridgeStatus::Pending,
            consumed: false,
            failure_reason: None,
            expires_at: now + Duration::seconds(self.timeout.as_secs() as i64),
            created_at: now,
            updated_at: now,
        };

        // The bridge row must exist before the leg row can receive events
        let request = match self.bridges.insert(&request).await {
            Ok(request) => request,
            Err(e) => {
                error!("Failed to store bridge for leg A {}: {}", leg_a_call_id, e);
                self.hangup_quietly(&leg_a_call_id).await;
                return Err(e);
            }
        };

        let mut leg = CallLeg::new(
            leg_a_call_id.clone(),
            caller_id.as_str(),
            cell.as_str(),
            CallDirection::Outbound,
        );
        leg.operator_id = Some(trigger.operator_id);
        leg.contact_id = trigger.contact_id;
        if let Err(e) = self.tracker.register(leg).await {
            error!("Failed to record leg A {}: {}", leg_a_call_id, e);
            self.hangup_quietly(&leg_a_call_id).await;
            match self
                .bridges
                .mark_failed(request.id, None, &format!("leg A not recorded: {}", e))
                .await
            {
                Ok(failed) => self.bus.publish(DialerEvent::BridgeUpdated(failed)),
                Err(mark_err) => warn!("Failed to mark bridge {} failed: {}", request.id, mark_err),
            }
            return Err(e);
        }

        info!(
            "Bridge {} pending: ringing {} before dialing {}",
            request.id, request.operator_number, request.target_number
        );
        self.bus.publish(DialerEvent::BridgeUpdated(request.clone()));
        Ok(request)
    }

    /// Leg A answered: dial the prospect and bridge the two legs
    ///
    /// Returns `None` when the call is not a bridge leg A, leg A has already
    /// hung up, or the request was already claimed. The deadline is checked
    /// against the answer's `occurred_at`, so an answer inside the window is
    /// bridged even if the timeout sweep ran first. Leg B failures are
    /// recorded on the request and published, not returned.
    #[instrument(skip(self, event), fields(call = %event.call_control_id))]
    pub async fn on_answered(&self, event: &CallEvent) -> AppResult<Option<BridgeRequest>> {
        let leg_a = event.call_control_id.as_str();
        let request = match self.bridges.find_by_leg_a(leg_a).await? {
            Some(request) => request,
            None => return Ok(None),
        };

        let token = match self.verify_token(&request, event.client_state.as_deref()) {
            Ok(token) => token,
            Err(e) => {
                if let Some(claimed) = self.bridges.claim(leg_a, event.occurred_at).await? {
                    let failed = self
                        .bridges
                        .mark_failed(claimed.id, None, &e.to_string())
                        .await?;
                    self.bus.publish(DialerEvent::BridgeUpdated(failed));
                }
                return Err(e);
            }
        };

        let leg_a_ended = self
            .tracker
            .find_by_provider_id(leg_a)
            .await?
            .is_some_and(|leg| leg.status == CallLegStatus::Hangup);
        if leg_a_ended {
            debug!("Bridge {} answer arrived after leg A hung up", request.id);
            return Ok(None);
        }

        let claimed = match self.bridges.claim(leg_a, event.occurred_at).await? {
            Some(claimed) => claimed,
            None => {
                if !request.consumed && request.is_expired_at(event.occurred_at) {
                    warn!("Bridge {} answered after expiry, hanging up leg A", request.id);
                    self.hangup_quietly(leg_a).await;
                } else {
                    debug!("Bridge {} already claimed", request.id);
                }
                return Ok(None);
            }
        };

        let leg_b = DialRequest {
            to: token.prospect_number.clone(),
            from: token.caller_id_number.clone(),
            client_state: None,
            timeout_secs: None,
        };
        let leg_b_call_id = match self.telephony.dial(&leg_b).await {
            Ok(id) => id,
            Err(e) => {
                return self
                    .fail(&claimed, None, &format!("leg B origination failed: {}", e))
                    .await
                    .map(Some)
            }
        };

        let mut leg = CallLeg::new(
            leg_b_call_id.clone(),
            token.caller_id_number.as_str(),
            token.prospect_number.as_str(),
            CallDirection::Outbound,
        );
        leg.operator_id = Some(token.operator_id.clone());
        leg.contact_id = token.contact_id;
        if let Err(e) = self.tracker.register(leg).await {
            warn!("Failed to record leg B {}: {}", leg_b_call_id, e);
        }

        if let Err(e) = self.telephony.bridge(leg_a, &leg_b_call_id).await {
            self.hangup_quietly(&leg_b_call_id).await;
            return self
                .fail(&claimed, Some(&leg_b_call_id), &format!("bridge failed: {}", e))
                .await
                .map(Some);
        }

        let bridged = self.bridges.mark_bridged(claimed.id, &leg_b_call_id).await?;
        info!("Bridge {} connected {} <-> {}", bridged.id, leg_a, leg_b_call_id);
        self.bus.publish(DialerEvent::BridgeUpdated(bridged.clone()));
        Ok(Some(bridged))
    }

    /// Leg A ended; a request still waiting for it can never complete
    pub async fn on_leg_terminated(&self, call_control_id: &str) -> AppResult<Option<BridgeRequest>> {
        let expired = self.bridges.expire_for_leg(call_control_id).await?;
        if let Some(request) = &expired {
            info!("Bridge {} expired, leg A ended unanswered", request.id);
            self.bus.publish(DialerEvent::BridgeUpdated(request.clone()));
        }
        Ok(expired)
    }

    /// Expire pending requests whose leg A never answered in time
    #[instrument(skip(self))]
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> AppResult<Vec<BridgeRequest>> {
        let expired = self.bridges.expire_stale(now).await?;
        for request in &expired {
            info!("Bridge {} timed out", request.id);
            self.bus.publish(DialerEvent::BridgeUpdated(request.clone()));
        }
        Ok(expired)
    }

    /// Remove finished requests older than the retention window
    pub async fn purge_finished(&self, older_than: DateTime<Utc>) -> AppResult<u64> {
        let purged = self.bridges.purge_finished(older_than).await?;
        if purged > 0 {
            debug!("Purged {} finished bridge requests", purged);
        }
        Ok(purged)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<BridgeRequest> {
        self.bridges
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bridge request {}", id)))
    }

    pub async fn find_by_leg_a(&self, leg_a_call_id: &str) -> AppResult<BridgeRequest> {
        self.bridges
            .find_by_leg_a(leg_a_call_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bridge for call {}", leg_a_call_id)))
    }

    async fn operator_cell(&self, operator_id: &str) -> AppResult<PhoneNumber> {
        let operator = self
            .operators
            .find_by_id(operator_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Operator {}", operator_id)))?;

        match operator.cell_phone.as_deref() {
            Some(cell) => PhoneNumber::parse(cell),
            None => Err(AppError::Validation(format!(
                "Operator {} has no cell phone on file",
                operator_id
            ))),
        }
    }

    fn verify_token(
        &self,
        request: &BridgeRequest,
        client_state: Option<&str>,
    ) -> AppResult<CorrelationToken> {
        let raw = client_state.ok_or_else(|| {
            AppError::InvalidCorrelationToken("answered event without client state".to_string())
        })?;
        let token = CorrelationToken::decode(raw)?;

        let matches = token.operator_id == request.operator_id
            && token.prospect_number.as_str() == request.target_number
            && token.caller_id_number.as_str() == request.source_number
            && token.contact_id == request.contact_id;
        if !matches {
            return Err(AppError::InvalidCorrelationToken(format!(
                "token does not match bridge {}",
                request.id
            )));
        }
        Ok(token)
    }

    async fn fail(
        &self,
        request: &BridgeRequest,
        leg_b_call_id: Option<&str>,
        reason: &str,
    ) -> AppResult<BridgeRequest> {
        warn!("Bridge {} failed: {}", request.id, reason);
        let failed = self
            .bridges
            .mark_failed(request.id, leg_b_call_id, reason)
            .await?;
        self.bus.publish(DialerEvent::BridgeUpdated(failed.clone()));
        self.bus.publish(DialerEvent::BridgeLegFailed {
            bridge_id: failed.id,
            operator_id: failed.operator_id.clone(),
            reason: reason.to_string(),
        });
        Ok(failed)
    }

    async fn hangup_quietly(&self, call_control_id: &str) {
        if let Err(e) = self.telephony.hangup(call_control_id).await {
            warn!("Hangup of {} failed: {}", call_control_id, e);
        }
    }
}
