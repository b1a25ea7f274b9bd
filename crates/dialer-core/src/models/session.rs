//! Dial session model
//!
//! A dial session is one operator's run through a prioritized queue of
//! contacts. It is the only owner of "what is being dialed right now".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is dialing through its queue
    #[default]
    Active,
    /// Operator paused; queue position is kept
    Paused,
    /// Queue exhausted or operator stopped
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Ended => write!(f, "ended"),
        }
    }
}

impl SessionStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(SessionStatus::Active),
            "paused" => Some(SessionStatus::Paused),
            "ended" => Some(SessionStatus::Ended),
            _ => None,
        }
    }

    /// Open sessions count towards the one-session-per-operator rule
    pub fn is_open(&self) -> bool {
        !matches!(self, SessionStatus::Ended)
    }
}

/// Dial session entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialSession {
    /// Unique identifier
    pub id: Uuid,

    /// Operator who owns the session
    pub owner_id: String,

    /// Current status
    pub status: SessionStatus,

    /// Caller id presented on legs originated by this session
    pub caller_id_number: String,

    /// Number of queue items already finished (completed, failed or skipped)
    pub cursor: i64,

    /// Queue item currently in DIALING, if any
    pub current_item_id: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// When the session ended
    pub ended_at: Option<DateTime<Utc>>,
}

impl DialSession {
    /// Create a new active session
    pub fn new(owner_id: impl Into<String>, caller_id_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            status: SessionStatus::Active,
            caller_id_number: caller_id_number.into(),
            cursor: 0,
            current_item_id: None,
            created_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Paused,
            SessionStatus::Ended,
        ] {
            assert_eq!(SessionStatus::from_str(&status.to_string()), Some(status));
        }
        assert_eq!(SessionStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_open_statuses() {
        assert!(SessionStatus::Active.is_open());
        assert!(SessionStatus::Paused.is_open());
        assert!(!SessionStatus::Ended.is_open());
    }

    #[test]
    fn test_new_session_is_active() {
        let s = DialSession::new("agent-1", "+15555556666");
        assert!(s.is_active());
        assert_eq!(s.cursor, 0);
        assert!(s.current_item_id.is_none());
    }
}
