//! Webhook envelope parsing
//!
//! The provider posts one JSON document per event:
//!
//! ```text
//! {"data": {"event_type": "call.answered", "id": "...", "occurred_at": "...",
//!           "payload": {"call_control_id": "...", "client_state": "...", ...}}}
//! ```
//!
//! The flat form without the `data` wrapper is accepted as well. Documents are
//! turned into typed [`CallEvent`]s; anything that is not a call event the
//! engine understands is reported as ignorable rather than as an error.

use chrono::{DateTime, Utc};
use dialer_core::models::{CallDirection, CallEvent, CallEventKind};
use dialer_core::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use tracing::debug;

/// Raw event as carried inside the envelope
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub event_type: String,

    /// Provider event id
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub payload: Value,
}

/// Result of parsing a webhook body
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedWebhook {
    Event(CallEvent),
    /// Well-formed JSON that carries nothing for the engine
    Ignored(String),
}

/// Parse a webhook request body
///
/// Fails only when the body is not JSON at all.
pub fn parse_webhook(body: &[u8]) -> AppResult<ParsedWebhook> {
    let document: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("Webhook body is not JSON: {}", e)))?;

    let inner = if document.get("data").map_or(false, Value::is_object) {
        document["data"].clone()
    } else {
        document
    };

    let data: WebhookData = match serde_json::from_value(inner) {
        Ok(data) => data,
        Err(e) => return Ok(ParsedWebhook::Ignored(format!("not an event envelope: {}", e))),
    };

    Ok(match to_call_event(&data) {
        Some(event) => ParsedWebhook::Event(event),
        None => ParsedWebhook::Ignored(format!("unhandled event {}", data.event_type)),
    })
}

/// Convert a raw event into a typed call event
pub fn to_call_event(data: &WebhookData) -> Option<CallEvent> {
    let payload = &data.payload;
    let call_control_id = str_field(payload, &["call_control_id"])?;

    let kind = match data.event_type.as_str() {
        "call.initiated" => CallEventKind::Initiated {
            direction: str_field(payload, &["direction"])
                .and_then(|d| CallDirection::from_str(&d))
                .unwrap_or_default(),
            from: str_field(payload, &["from"]).unwrap_or_default(),
            to: str_field(payload, &["to"]).unwrap_or_default(),
        },
        "call.ringing" => CallEventKind::Ringing,
        "call.answered" => CallEventKind::Answered,
        "call.bridged" => CallEventKind::Bridged,
        "call.hangup" => CallEventKind::Hangup {
            cause: str_field(payload, &["hangup_cause"]),
            duration_secs: duration_secs(payload).unwrap_or(0),
            cost: cost(payload),
        },
        "call.recording.saved" => CallEventKind::RecordingSaved {
            recording_url: recording_url(payload)?,
        },
        "call.machine.detection.ended" => CallEventKind::MachineDetectionEnded {
            result: str_field(payload, &["result"])?,
        },
        other => {
            debug!("Ignoring webhook event type {}", other);
            return None;
        }
    };

    let event_id = match &data.id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => content_id(data, &call_control_id),
    };
    let occurred_at = data.occurred_at.unwrap_or_else(Utc::now);

    Some(CallEvent {
        event_id,
        call_control_id,
        occurred_at,
        client_state: str_field(payload, &["client_state"]),
        kind,
    })
}

/// Id for an event the provider sent without one
///
/// Derived from the event content only, so a redelivery maps to the same id.
fn content_id(data: &WebhookData, call_control_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.event_type.as_bytes());
    if let Some(at) = data.occurred_at {
        hasher.update(at.to_rfc3339().as_bytes());
    }
    // serde_json maps are ordered, so equal payloads serialize identically
    hasher.update(data.payload.to_string().as_bytes());
    format!(
        "{}:{}:{:x}",
        data.event_type,
        call_control_id,
        hasher.finalize()
    )
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn duration_secs(payload: &Value) -> Option<i32> {
    for key in ["call_duration_secs", "duration_secs", "duration"] {
        if let Some(v) = payload.get(key) {
            if let Some(n) = v.as_i64() {
                return i32::try_from(n).ok();
            }
            if let Some(s) = v.as_str() {
                if let Ok(n) = s.parse() {
                    return Some(n);
                }
            }
        }
    }

    let start = str_field(payload, &["start_time"])?;
    let end = str_field(payload, &["end_time"])?;
    let start = DateTime::parse_from_rfc3339(&start).ok()?;
    let end = DateTime::parse_from_rfc3339(&end).ok()?;
    i32::try_from((end - start).num_seconds().max(0)).ok()
}

fn cost(payload: &Value) -> Option<Decimal> {
    let raw = payload.get("cost")?;
    let raw = raw.get("amount").unwrap_or(raw);

    match raw {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn recording_url(payload: &Value) -> Option<String> {
    ["recording_urls", "public_recording_urls"]
        .iter()
        .filter_map(|k| payload.get(*k))
        .find_map(|urls| str_field(urls, &["mp3", "wav"]))
        .or_else(|| str_field(payload, &["recording_url"]))
}
