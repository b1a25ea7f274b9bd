//! Telephony provider integration
//!
//! - [`event`]: turns provider webhook bodies into typed call events
//! - [`client`]: the call-control REST client used to dial, bridge and hang up

pub mod client;
pub mod event;

pub use client::CallControlClient;
pub use event::{parse_webhook, ParsedWebhook, WebhookData};
