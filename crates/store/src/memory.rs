//! In-memory snapshot store
//!
//! Holds the three collections as plain vectors and answers filter queries by
//! linear scan. Construction validates every record against the model
//! invariants, so downstream analytics can assume a well-formed snapshot.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use pulse_model::{EventRecord, ExperimentAssignment, User, UserId};

use crate::error::{Result, StoreError};
use crate::filter::{AssignmentFilter, EventFilter, UserFilter};
use crate::EventStore;

/// Immutable in-memory snapshot of the source tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    users: Vec<User>,
    events: Vec<EventRecord>,
    assignments: Vec<ExperimentAssignment>,
}

impl MemoryStore {
    /// Build a snapshot, validating every record
    ///
    /// Events must reference a known user and never precede that user's
    /// signup; assignments must reference a known user and carry a
    /// consistent conversion state.
    pub fn new(
        users: Vec<User>,
        events: Vec<EventRecord>,
        assignments: Vec<ExperimentAssignment>,
    ) -> Result<Self> {
        let signup_dates: HashMap<UserId, NaiveDate> =
            users.iter().map(|u| (u.id, u.signup_date)).collect();

        for event in &events {
            let signup = signup_dates
                .get(&event.user_id)
                .copied()
                .ok_or(StoreError::UnknownUser(event.user_id))?;
            event.validate(signup)?;
        }
        for assignment in &assignments {
            if !signup_dates.contains_key(&assignment.user_id) {
                return Err(StoreError::UnknownUser(assignment.user_id));
            }
            assignment.validate()?;
        }

        tracing::debug!(
            users = users.len(),
            events = events.len(),
            assignments = assignments.len(),
            "loaded snapshot"
        );

        Ok(Self {
            users,
            events,
            assignments,
        })
    }

    /// Number of users in the snapshot
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        Ok(self
            .users
            .iter()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect())
    }

    async fn events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>> {
        Ok(self
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn assignments(&self, filter: &AssignmentFilter) -> Result<Vec<ExperimentAssignment>> {
        Ok(self
            .assignments
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pulse_model::{Channel, EventKind, Group};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn sample_users() -> Vec<User> {
        vec![
            User::new(1, date(1), Channel::Organic, "high_potential"),
            User::new(2, date(2), Channel::Paid, "low_potential"),
        ]
    }

    #[tokio::test]
    async fn test_filtered_reads() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();
        let events = vec![
            EventRecord::new(1, 1, EventKind::AppOpen, ts),
            EventRecord::new(2, 2, EventKind::RewardEarned, ts).with_value(3.0),
        ];
        let assignments = vec![
            ExperimentAssignment::new(1, Group::Control, ts),
            ExperimentAssignment::new(2, Group::Treatment, ts).converted_at(ts),
        ];
        let store = MemoryStore::new(sample_users(), events, assignments).unwrap();

        let paid = store
            .users(&UserFilter::all().with_channel(Channel::Paid))
            .await
            .unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].id, UserId(2));

        let rewards = store
            .events(&EventFilter::all().with_kind(EventKind::RewardEarned))
            .await
            .unwrap();
        assert_eq!(rewards.len(), 1);

        let converted = store
            .assignments(&AssignmentFilter::all().with_converted(true))
            .await
            .unwrap();
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].group, Group::Treatment);
    }

    #[test]
    fn test_unknown_user_rejected() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();
        let events = vec![EventRecord::new(1, 99, EventKind::AppOpen, ts)];
        let result = MemoryStore::new(sample_users(), events, Vec::new());
        assert!(matches!(result, Err(StoreError::UnknownUser(_))));
    }

    #[test]
    fn test_invariant_violation_rejected() {
        // event on June 1 for a user who signed up June 2
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let events = vec![EventRecord::new(1, 2, EventKind::AppOpen, ts)];
        let result = MemoryStore::new(sample_users(), events, Vec::new());
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
    }
}
