//! Call dispositions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome classification recorded after a call ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Interested,
    NotInterested,
    Callback,
    NoAnswer,
    Voicemail,
    Busy,
    WrongNumber,
    DoNotCall,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Interested => "interested",
            Disposition::NotInterested => "not_interested",
            Disposition::Callback => "callback",
            Disposition::NoAnswer => "no_answer",
            Disposition::Voicemail => "voicemail",
            Disposition::Busy => "busy",
            Disposition::WrongNumber => "wrong_number",
            Disposition::DoNotCall => "do_not_call",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "interested" => Some(Disposition::Interested),
            "not_interested" => Some(Disposition::NotInterested),
            "callback" => Some(Disposition::Callback),
            "no_answer" => Some(Disposition::NoAnswer),
            "voicemail" => Some(Disposition::Voicemail),
            "busy" => Some(Disposition::Busy),
            "wrong_number" => Some(Disposition::WrongNumber),
            "do_not_call" => Some(Disposition::DoNotCall),
            _ => None,
        }
    }

    /// Whether the outcome implies a live conversation with the prospect
    pub fn is_contact(&self) -> bool {
        matches!(
            self,
            Disposition::Interested
                | Disposition::NotInterested
                | Disposition::Callback
                | Disposition::DoNotCall
        )
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_outcomes() {
        assert!(Disposition::Interested.is_contact());
        assert!(Disposition::DoNotCall.is_contact());
        assert!(!Disposition::NoAnswer.is_contact());
        assert!(!Disposition::Voicemail.is_contact());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Disposition::from_str("Not_Interested"),
            Some(Disposition::NotInterested)
        );
        assert_eq!(Disposition::from_str("maybe"), None);
        let json = serde_json::to_string(&Disposition::WrongNumber).unwrap();
        assert_eq!(json, "\"wrong_number\"");
    }
}
