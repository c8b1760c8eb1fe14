//! User records and acquisition metadata

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Unique user identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Acquisition channel a user signed up through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Organic discovery (search, word of mouth)
    Organic,
    /// Paid acquisition campaigns
    Paid,
    /// Referral programs
    Referral,
}

impl Channel {
    /// Get the string name of this channel
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organic => "organic",
            Self::Paid => "paid",
            Self::Referral => "referral",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user record, created once at signup and immutable thereafter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: UserId,
    /// Signup date (calendar date, cohort anchor)
    pub signup_date: NaiveDate,
    /// Acquisition channel
    pub channel: Channel,
    /// Initial segment label assigned at signup (e.g. "high_potential")
    pub initial_segment: String,
}

impl User {
    /// Create a new user record
    pub fn new(
        id: impl Into<UserId>,
        signup_date: NaiveDate,
        channel: Channel,
        initial_segment: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            signup_date,
            channel,
            initial_segment: initial_segment.into(),
        }
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_roundtrip() {
        let json = serde_json::to_string(&Channel::Paid).unwrap();
        assert_eq!(json, "\"paid\"");
        let channel: Channel = serde_json::from_str(&json).unwrap();
        assert_eq!(channel, Channel::Paid);
    }

    #[test]
    fn test_user_id_transparent() {
        let user = User::new(
            42,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            Channel::Organic,
            "medium_potential",
        );
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("\"id\":42"));
    }
}
