//! Billing ledger entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One billed call, keyed by provider call id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub provider_call_id: String,
    pub call_leg_id: Uuid,
    pub phone_number: String,
    pub cost: Decimal,
    pub recorded_at: DateTime<Utc>,
}
