//! Dialable phone numbers
//!
//! Numbers are normalized to E.164 (`+` followed by 8-15 digits) before they
//! reach the provider. Ten digit numbers are treated as North American.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;

/// A validated, E.164 formatted phone number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and normalize a user supplied number
    ///
    /// Accepts common formatting characters (spaces, dashes, dots,
    /// parentheses). Anything else, or a digit count outside the E.164
    /// range, is rejected with `AppError::InvalidNumber`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        let (has_plus, rest) = match trimmed.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let mut digits = String::with_capacity(rest.len());
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return Err(AppError::InvalidNumber(raw.to_string())),
            }
        }

        let normalized = if has_plus {
            digits
        } else if digits.len() == 10 {
            format!("1{}", digits)
        } else {
            digits
        };

        if normalized.len() < MIN_DIGITS
            || normalized.len() > MAX_DIGITS
            || normalized.starts_with('0')
        {
            return Err(AppError::InvalidNumber(raw.to_string()));
        }

        Ok(Self(format!("+{}", normalized)))
    }

    /// The E.164 string, including the leading `+`
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_e164() {
        let n = PhoneNumber::parse("+15551112222").unwrap();
        assert_eq!(n.as_str(), "+15551112222");
    }

    #[test]
    fn test_parse_formatted_north_american() {
        let n = PhoneNumber::parse("(555) 111-2222").unwrap();
        assert_eq!(n.as_str(), "+15551112222");

        let n = PhoneNumber::parse("1 555 111 2222").unwrap();
        assert_eq!(n.as_str(), "+15551112222");
    }

    #[test]
    fn test_reject_garbage() {
        assert!(matches!(
            PhoneNumber::parse("abc"),
            Err(AppError::InvalidNumber(_))
        ));
        assert!(PhoneNumber::parse("").is_err());
        assert!(PhoneNumber::parse("+1555x1112222").is_err());
        assert!(PhoneNumber::parse("12345").is_err());
        assert!(PhoneNumber::parse("+1234567890123456").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let ok: Result<PhoneNumber, _> = serde_json::from_str("\"+15553334444\"");
        assert!(ok.is_ok());
        let bad: Result<PhoneNumber, _> = serde_json::from_str("\"not a number\"");
        assert!(bad.is_err());
    }
}
