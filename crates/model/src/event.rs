//! Behavior event log records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserId;
use crate::{ModelError, Result};

/// Kind of behavior event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// App opened / session started
    AppOpen,
    /// User earned a reward (carries a value)
    RewardEarned,
    /// User completed an in-app activity
    ActivityCompleted,
    /// App closed / session ended
    AppClose,
}

impl EventKind {
    /// Get the string name of this event kind
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppOpen => "app_open",
            Self::RewardEarned => "reward_earned",
            Self::ActivityCompleted => "activity_completed",
            Self::AppClose => "app_close",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single append-only behavior event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier
    pub id: u64,
    /// Owning user
    pub user_id: UserId,
    /// What happened
    pub kind: EventKind,
    /// When it happened (never before the user's signup)
    pub timestamp: DateTime<Utc>,
    /// Optional numeric payload (reward amount, etc.), non-negative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl EventRecord {
    /// Create a new event record
    pub fn new(id: u64, user_id: impl Into<UserId>, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            kind,
            timestamp,
            value: None,
        }
    }

    /// Attach a numeric value (reward amount, etc.)
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Calendar date of this event (UTC)
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Validate this event against the owning user's signup date
    pub fn validate(&self, signup_date: NaiveDate) -> Result<()> {
        if self.date() < signup_date {
            return Err(ModelError::EventBeforeSignup {
                event_id: self.id,
                user_id: self.user_id,
            });
        }
        if let Some(value) = self.value {
            if value < 0.0 {
                return Err(ModelError::NegativeEventValue {
                    event_id: self.id,
                    value,
                });
            }
        }
        Ok(())
    }
}
