//! CRM contact and operator views consumed by the dialer

use serde::{Deserialize, Serialize};

/// Contact as seen by the dialer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub display_name: String,
    pub phone: Option<String>,
}

/// Operator with an optional registered cell phone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub cell_phone: Option<String>,
}
