//! Experiment assignment and conversion records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserId;
use crate::{ModelError, Result};

/// Experiment group label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    /// Baseline experience
    Control,
    /// Variant under test
    Treatment,
}

impl Group {
    /// Get the string name of this group
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Treatment => "treatment",
        }
    }

    /// The opposite group
    pub const fn other(self) -> Self {
        match self {
            Self::Control => Self::Treatment,
            Self::Treatment => Self::Control,
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's experiment assignment, one per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    /// Assigned user
    pub user_id: UserId,
    /// Experiment group
    pub group: Group,
    /// Whether the user converted
    pub converted: bool,
    /// When assignment happened
    pub assigned_at: DateTime<Utc>,
    /// When conversion happened; present iff `converted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<DateTime<Utc>>,
}

impl ExperimentAssignment {
    /// Create a non-converted assignment
    pub fn new(user_id: impl Into<UserId>, group: Group, assigned_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            group,
            converted: false,
            assigned_at,
            converted_at: None,
        }
    }

    /// Mark this assignment as converted at the given instant
    pub fn converted_at(mut self, instant: DateTime<Utc>) -> Self {
        self.converted = true;
        self.converted_at = Some(instant);
        self
    }

    /// Validate the conversion-state invariant:
    /// `converted_at` is present iff `converted`, and never precedes assignment
    pub fn validate(&self) -> Result<()> {
        match (self.converted, self.converted_at) {
            (true, Some(at)) if at >= self.assigned_at => Ok(()),
            (false, None) => Ok(()),
            _ => Err(ModelError::InconsistentConversion(self.user_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_converted_requires_timestamp() {
        let mut assignment = ExperimentAssignment::new(1, Group::Treatment, ts(1, 9));
        assignment.converted = true;
        assert!(assignment.validate().is_err());
    }

    #[test]
    fn test_conversion_before_assignment_rejected() {
        let assignment = ExperimentAssignment::new(1, Group::Control, ts(2, 9)).converted_at(ts(1, 9));
        assert!(assignment.validate().is_err());
    }

    #[test]
    fn test_valid_states() {
        let unconverted = ExperimentAssignment::new(1, Group::Control, ts(1, 9));
        assert!(unconverted.validate().is_ok());

        let converted = ExperimentAssignment::new(2, Group::Treatment, ts(1, 9)).converted_at(ts(3, 18));
        assert!(converted.validate().is_ok());
    }
}
