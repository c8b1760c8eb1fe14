//! Filter predicates for store reads
//!
//! Filters are simple conjunctive predicates: every populated field must
//! match. An empty filter matches everything.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pulse_model::{Channel, EventKind, EventRecord, ExperimentAssignment, Group, User, UserId};

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First date in the range
    pub start: NaiveDate,
    /// Last date in the range
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a new range; `start` and `end` are both inclusive
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Whether a date falls inside this range
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whether a timestamp's UTC calendar date falls inside this range
    pub fn contains_instant(&self, instant: DateTime<Utc>) -> bool {
        self.contains(instant.date_naive())
    }
}

/// Predicate over the users collection
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Restrict to specific user ids
    pub ids: Option<Vec<UserId>>,
    /// Restrict to a signup date range
    pub signup_range: Option<DateRange>,
    /// Restrict to an acquisition channel
    pub channel: Option<Channel>,
}

impl UserFilter {
    /// Match all users
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to the given user ids
    pub fn with_ids(mut self, ids: Vec<UserId>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Restrict to users who signed up inside the range
    pub fn with_signup_range(mut self, range: DateRange) -> Self {
        self.signup_range = Some(range);
        self
    }

    /// Restrict to one acquisition channel
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Evaluate this predicate against a record
    pub fn matches(&self, user: &User) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&user.id) {
                return false;
            }
        }
        if let Some(range) = &self.signup_range {
            if !range.contains(user.signup_date) {
                return false;
            }
        }
        if let Some(channel) = self.channel {
            if user.channel != channel {
                return false;
            }
        }
        true
    }
}

/// Predicate over the event log
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Restrict to one user
    pub user_id: Option<UserId>,
    /// Restrict to specific event kinds
    pub kinds: Option<Vec<EventKind>>,
    /// Restrict to events whose date falls in the range
    pub date_range: Option<DateRange>,
}

impl EventFilter {
    /// Match all events
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one user's events
    pub fn for_user(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restrict to one event kind
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Restrict to events inside the date range
    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Evaluate this predicate against a record
    pub fn matches(&self, event: &EventRecord) -> bool {
        if let Some(user_id) = self.user_id {
            if event.user_id != user_id {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(range) = &self.date_range {
            if !range.contains_instant(event.timestamp) {
                return false;
            }
        }
        true
    }
}

/// Predicate over the experiment assignments collection
#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    /// Restrict to one experiment group
    pub group: Option<Group>,
    /// Restrict to converted (true) or unconverted (false) users
    pub converted: Option<bool>,
}

impl AssignmentFilter {
    /// Match all assignments
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one group
    pub fn with_group(mut self, group: Group) -> Self {
        self.group = Some(group);
        self
    }

    /// Restrict by conversion outcome
    pub fn with_converted(mut self, converted: bool) -> Self {
        self.converted = Some(converted);
        self
    }

    /// Evaluate this predicate against a record
    pub fn matches(&self, assignment: &ExperimentAssignment) -> bool {
        if let Some(group) = self.group {
            if assignment.group != group {
                return false;
            }
        }
        if let Some(converted) = self.converted {
            if assignment.converted != converted {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_date_range_inclusive() {
        let range = DateRange::new(date(1), date(7));
        assert!(range.contains(date(1)));
        assert!(range.contains(date(7)));
        assert!(!range.contains(date(8)));
    }

    #[test]
    fn test_user_filter_conjunction() {
        let user = User::new(1, date(3), Channel::Paid, "high_potential");
        let filter = UserFilter::all()
            .with_channel(Channel::Paid)
            .with_signup_range(DateRange::new(date(1), date(5)));
        assert!(filter.matches(&user));

        let filter = filter.with_channel(Channel::Organic);
        assert!(!filter.matches(&user));
    }

    #[test]
    fn test_event_filter_kinds() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
        let event = EventRecord::new(1, 1, EventKind::RewardEarned, ts);
        assert!(EventFilter::all()
            .with_kind(EventKind::RewardEarned)
            .matches(&event));
        assert!(!EventFilter::all()
            .with_kind(EventKind::AppOpen)
            .matches(&event));
    }
}
