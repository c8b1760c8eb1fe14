//! Behavioral feature extraction
//!
//! Builds the per-user numeric feature table that clustering runs on, plus
//! profile fields (conversion outcome, first-reward latency, D7 activity)
//! used for cluster summaries. A user with no qualifying events gets zeros,
//! never an error.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use pulse_model::{EventKind, Group, UserId};
use pulse_store::{AssignmentFilter, EventFilter, EventStore, UserFilter};

use crate::error::{AnalyticsError, Result};

/// Named feature columns, validated at the segmentation entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Ordered column names
    pub columns: Vec<String>,
}

impl FeatureSchema {
    /// The standard behavioral schema used for clustering
    pub fn standard() -> Self {
        Self::new([
            "total_events",
            "active_days",
            "reward_count",
            "total_reward_value",
            "activities_completed",
            "avg_daily_events",
            "activity_ratio",
        ])
    }

    /// Create a schema from column names
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Per-user numeric feature vectors, one row per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    /// Column names, in row order
    pub schema: FeatureSchema,
    /// User each row belongs to, ascending by id
    pub user_ids: Vec<UserId>,
    /// Raw (unstandardized) feature rows
    pub rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    /// Number of users in the table
    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    /// Validate this table against an expected schema, failing fast on
    /// missing or extra columns
    pub fn validate_schema(&self, expected: &FeatureSchema) -> Result<()> {
        let have: HashSet<&str> = self.schema.columns.iter().map(String::as_str).collect();
        let want: HashSet<&str> = expected.columns.iter().map(String::as_str).collect();

        let missing: Vec<&str> = expected
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !have.contains(c))
            .collect();
        if !missing.is_empty() {
            return Err(AnalyticsError::InvalidInput(format!(
                "feature table is missing columns: {}",
                missing.join(", ")
            )));
        }
        let extra: Vec<&str> = self
            .schema
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !want.contains(c))
            .collect();
        if !extra.is_empty() {
            return Err(AnalyticsError::InvalidInput(format!(
                "feature table has unexpected columns: {}",
                extra.join(", ")
            )));
        }
        Ok(())
    }
}

/// Non-clustered profile fields carried alongside the feature row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserProfile {
    /// Signup date
    pub signup: NaiveDate,
    /// Days from signup to the first reward, if any reward was earned
    pub days_to_first_reward: Option<f64>,
    /// Experiment group, if the user was assigned
    pub group: Option<Group>,
    /// Conversion outcome, if the user was assigned
    pub converted: Option<bool>,
    /// Whether the D7 horizon has elapsed by the snapshot date
    pub d7_eligible: bool,
    /// Whether the user was active exactly 7 days after signup
    pub d7_retained: bool,
}

/// Feature extraction output: the table plus per-user profiles
#[derive(Debug, Clone)]
pub struct ExtractedFeatures {
    /// Clustering input
    pub table: FeatureTable,
    /// Profile fields keyed by user, same population as the table
    pub profiles: BTreeMap<UserId, UserProfile>,
}

/// Extract the standard behavioral features for every user in the store
pub async fn extract_features(
    store: &dyn EventStore,
    today: NaiveDate,
) -> Result<ExtractedFeatures> {
    let mut users = store.users(&UserFilter::all()).await?;
    users.sort_by_key(|u| u.id);
    let events = store.events(&EventFilter::all()).await?;
    let assignments = store.assignments(&AssignmentFilter::all()).await?;

    struct Accumulator {
        total_events: u64,
        active_dates: HashSet<NaiveDate>,
        reward_count: u64,
        total_reward_value: f64,
        activities_completed: u64,
        first_reward: Option<NaiveDate>,
    }

    let mut accumulators: HashMap<UserId, Accumulator> = users
        .iter()
        .map(|user| {
            (
                user.id,
                Accumulator {
                    total_events: 0,
                    active_dates: HashSet::new(),
                    reward_count: 0,
                    total_reward_value: 0.0,
                    activities_completed: 0,
                    first_reward: None,
                },
            )
        })
        .collect();

    for event in &events {
        let Some(acc) = accumulators.get_mut(&event.user_id) else {
            continue;
        };
        acc.total_events += 1;
        acc.active_dates.insert(event.date());
        match event.kind {
            EventKind::RewardEarned => {
                acc.reward_count += 1;
                acc.total_reward_value += event.value.unwrap_or(0.0);
                let date = event.date();
                acc.first_reward = Some(match acc.first_reward {
                    Some(first) if first <= date => first,
                    _ => date,
                });
            }
            EventKind::ActivityCompleted => acc.activities_completed += 1,
            EventKind::AppOpen | EventKind::AppClose => {}
        }
    }

    let mut experiment: HashMap<UserId, (Group, bool)> = HashMap::new();
    for assignment in &assignments {
        experiment.insert(assignment.user_id, (assignment.group, assignment.converted));
    }

    let mut rows = Vec::with_capacity(users.len());
    let mut user_ids = Vec::with_capacity(users.len());
    let mut profiles = BTreeMap::new();

    for user in &users {
        let acc = &accumulators[&user.id];
        let days_since_signup = (today - user.signup_date).num_days().max(0) as f64;
        let total_events = acc.total_events as f64;
        let active_days = acc.active_dates.len() as f64;

        let (avg_daily_events, activity_ratio) = if days_since_signup > 0.0 {
            (
                total_events / days_since_signup,
                active_days / days_since_signup,
            )
        } else {
            (0.0, 0.0)
        };

        rows.push(vec![
            total_events,
            active_days,
            acc.reward_count as f64,
            acc.total_reward_value,
            acc.activities_completed as f64,
            avg_daily_events,
            activity_ratio,
        ]);
        user_ids.push(user.id);

        let d7_target = user.signup_date + Duration::days(7);
        let (group, converted) = match experiment.get(&user.id) {
            Some(&(group, converted)) => (Some(group), Some(converted)),
            None => (None, None),
        };
        profiles.insert(
            user.id,
            UserProfile {
                signup: user.signup_date,
                days_to_first_reward: acc
                    .first_reward
                    .map(|date| (date - user.signup_date).num_days() as f64),
                group,
                converted,
                d7_eligible: d7_target <= today,
                d7_retained: acc.active_dates.contains(&d7_target),
            },
        );
    }

    tracing::debug!(users = user_ids.len(), "extracted behavioral features");

    Ok(ExtractedFeatures {
        table: FeatureTable {
            schema: FeatureSchema::standard(),
            user_ids,
            rows,
        },
        profiles,
    })
}
