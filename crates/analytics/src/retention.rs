//! Cohort retention analysis
//!
//! Computes per-horizon retention (D1..D30) across the whole population and
//! per signup cohort, with mandatory censoring of horizons that have not
//! fully elapsed. A user is retained at horizon H when they were active on
//! the calendar date exactly H days after signup (the default, statistically
//! conservative definition; a cumulative definition is available as an
//! explicit configuration choice).
//!
//! An optional split compares retention between users who did and did not
//! earn a reward shortly after signup, attaching a rate difference and a
//! chi-square test of independence per horizon.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use pulse_model::{EventKind, UserId};
use pulse_store::{EventFilter, EventStore, UserFilter};

use crate::abtest::DEFAULT_ALPHA;
use crate::error::Result;
use crate::stats::{self, Chi2Test};

/// Retention horizon in days after signup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    /// One day after signup
    D1,
    /// Three days after signup
    D3,
    /// One week after signup
    D7,
    /// Two weeks after signup
    D14,
    /// Thirty days after signup
    D30,
}

impl Horizon {
    /// All horizons, shortest first
    pub const ALL: [Horizon; 5] = [Self::D1, Self::D3, Self::D7, Self::D14, Self::D30];

    /// Number of days after signup
    pub const fn days(self) -> i64 {
        match self {
            Self::D1 => 1,
            Self::D3 => 3,
            Self::D7 => 7,
            Self::D14 => 14,
            Self::D30 => 30,
        }
    }

    /// Label used in report keys
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::D1 => "D1",
            Self::D3 => "D3",
            Self::D7 => "D7",
            Self::D14 => "D14",
            Self::D30 => "D30",
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How users are grouped into cohorts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortKey {
    /// One cohort per signup date
    SignupDate,
    /// One cohort per signup week (anchored on Monday)
    SignupWeek,
}

impl CohortKey {
    /// Cohort anchor date for a signup date
    pub fn cohort_of(self, signup: NaiveDate) -> NaiveDate {
        match self {
            Self::SignupDate => signup,
            Self::SignupWeek => {
                signup - Duration::days(signup.weekday().num_days_from_monday() as i64)
            }
        }
    }
}

/// What "retained at horizon H" means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionDefinition {
    /// Active on the calendar date exactly `signup + H`
    ExactDay,
    /// Active on any date after signup up to and including `signup + H`
    CumulativeSinceSignup,
}

/// Split predicate for comparative retention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SplitBy {
    /// Users who earned a reward within `hours` of the start of their
    /// signup day versus users who did not
    RewardWithin {
        /// Window length in hours
        hours: i64,
    },
}

/// Retention computation request
#[derive(Debug, Clone)]
pub struct RetentionRequest {
    /// Horizons to compute
    pub horizons: Vec<Horizon>,
    /// Cohort grouping
    pub cohort_key: CohortKey,
    /// Retained-at-H definition
    pub definition: RetentionDefinition,
    /// Optional split comparison
    pub split: Option<SplitBy>,
    /// Snapshot date; horizons ending after it are censored
    pub today: NaiveDate,
    /// Significance level for split comparisons
    pub alpha: f64,
}

impl RetentionRequest {
    /// Create a request with all horizons, weekly cohorts, the exact-day
    /// definition, and alpha 0.05
    pub fn new(today: NaiveDate) -> Self {
        Self {
            horizons: Horizon::ALL.to_vec(),
            cohort_key: CohortKey::SignupWeek,
            definition: RetentionDefinition::ExactDay,
            split: None,
            today,
            alpha: DEFAULT_ALPHA,
        }
    }

    /// Restrict to specific horizons
    pub fn with_horizons(mut self, horizons: Vec<Horizon>) -> Self {
        self.horizons = horizons;
        self
    }

    /// Set the cohort grouping
    pub fn with_cohort_key(mut self, key: CohortKey) -> Self {
        self.cohort_key = key;
        self
    }

    /// Set the retention definition
    pub fn with_definition(mut self, definition: RetentionDefinition) -> Self {
        self.definition = definition;
        self
    }

    /// Add a split comparison
    pub fn with_split(mut self, split: SplitBy) -> Self {
        self.split = Some(split);
        self
    }

    /// Set the significance level for split comparisons
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

/// Retention counts for one horizon over some user set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionRecord {
    /// Horizon the counts are for
    pub horizon: Horizon,
    /// Users whose horizon has fully elapsed
    pub eligible: u64,
    /// Eligible users active at the horizon
    pub retained: u64,
    /// `retained / eligible`; undefined when nobody is eligible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

impl RetentionRecord {
    fn from_counts(horizon: Horizon, eligible: u64, retained: u64) -> Self {
        let rate = if eligible > 0 {
            Some(retained as f64 / eligible as f64)
        } else {
            None
        };
        Self {
            horizon,
            eligible,
            retained,
            rate,
        }
    }
}

/// Retention curve for one signup cohort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRetention {
    /// Cohort anchor date
    pub cohort: NaiveDate,
    /// Users in the cohort
    pub size: u64,
    /// Per-horizon retention
    pub horizons: Vec<RetentionRecord>,
}

/// One horizon's comparison between the two split arms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitComparison {
    /// Horizon compared
    pub horizon: Horizon,
    /// Users matching the split predicate
    pub matched: RetentionRecord,
    /// Users not matching it
    pub unmatched: RetentionRecord,
    /// `matched.rate - unmatched.rate`; undefined when either is undefined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_difference: Option<f64>,
    /// Chi-square test of independence on retained/not x matched/not
    pub chi_square: Chi2Test,
    /// Whether the arms differ significantly at the requested alpha
    pub significant: bool,
}

/// Split section of a retention report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitReport {
    /// The predicate used
    pub split: SplitBy,
    /// Significance level the comparisons were evaluated at
    pub alpha: f64,
    /// Per-horizon comparisons
    pub comparisons: Vec<SplitComparison>,
}

/// Complete retention analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionReport {
    /// Retained-at-H definition used
    pub definition: RetentionDefinition,
    /// Cohort grouping used
    pub cohort_key: CohortKey,
    /// Snapshot date the censoring was evaluated against
    pub today: NaiveDate,
    /// Population-wide per-horizon retention
    pub overall: Vec<RetentionRecord>,
    /// Per-cohort curves, oldest cohort first
    pub cohorts: Vec<CohortRetention>,
    /// Split comparison, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitReport>,
}

/// Per-user state needed for retention: signup date and distinct active dates
struct UserTimeline {
    signup: NaiveDate,
    active_dates: HashSet<NaiveDate>,
}

impl UserTimeline {
    fn eligible(&self, horizon: Horizon, today: NaiveDate) -> bool {
        self.signup + Duration::days(horizon.days()) <= today
    }

    fn retained(&self, horizon: Horizon, definition: RetentionDefinition) -> bool {
        let target = self.signup + Duration::days(horizon.days());
        match definition {
            RetentionDefinition::ExactDay => self.active_dates.contains(&target),
            RetentionDefinition::CumulativeSinceSignup => self
                .active_dates
                .iter()
                .any(|&date| self.signup < date && date <= target),
        }
    }
}

/// Compute cohort retention over the whole snapshot
pub async fn compute_retention(
    store: &dyn EventStore,
    request: &RetentionRequest,
) -> Result<RetentionReport> {
    let users = store.users(&UserFilter::all()).await?;
    let events = store.events(&EventFilter::all()).await?;

    // distinct active dates per user; duplicate same-day events collapse
    let mut timelines: HashMap<UserId, UserTimeline> = users
        .iter()
        .map(|user| {
            (
                user.id,
                UserTimeline {
                    signup: user.signup_date,
                    active_dates: HashSet::new(),
                },
            )
        })
        .collect();
    for event in &events {
        if let Some(timeline) = timelines.get_mut(&event.user_id) {
            timeline.active_dates.insert(event.date());
        }
    }

    tracing::debug!(
        users = timelines.len(),
        events = events.len(),
        today = %request.today,
        "computing retention"
    );

    let all: Vec<&UserTimeline> = timelines.values().collect();
    let overall = retention_records(&all, &request.horizons, request.definition, request.today);

    // cohort curves
    let mut by_cohort: BTreeMap<NaiveDate, Vec<&UserTimeline>> = BTreeMap::new();
    for timeline in timelines.values() {
        by_cohort
            .entry(request.cohort_key.cohort_of(timeline.signup))
            .or_default()
            .push(timeline);
    }
    let cohorts = by_cohort
        .into_iter()
        .map(|(cohort, members)| CohortRetention {
            cohort,
            size: members.len() as u64,
            horizons: retention_records(
                &members,
                &request.horizons,
                request.definition,
                request.today,
            ),
        })
        .collect();

    let split = match request.split {
        Some(split) => Some(compute_split(store, &timelines, request, split).await?),
        None => None,
    };

    Ok(RetentionReport {
        definition: request.definition,
        cohort_key: request.cohort_key,
        today: request.today,
        overall,
        cohorts,
        split,
    })
}

fn retention_records(
    users: &[&UserTimeline],
    horizons: &[Horizon],
    definition: RetentionDefinition,
    today: NaiveDate,
) -> Vec<RetentionRecord> {
    horizons
        .iter()
        .map(|&horizon| {
            let mut eligible = 0u64;
            let mut retained = 0u64;
            for user in users {
                if !user.eligible(horizon, today) {
                    continue;
                }
                eligible += 1;
                if user.retained(horizon, definition) {
                    retained += 1;
                }
            }
            RetentionRecord::from_counts(horizon, eligible, retained)
        })
        .collect()
}

async fn compute_split(
    store: &dyn EventStore,
    timelines: &HashMap<UserId, UserTimeline>,
    request: &RetentionRequest,
    split: SplitBy,
) -> Result<SplitReport> {
    let SplitBy::RewardWithin { hours } = split;

    let rewards = store
        .events(&EventFilter::all().with_kind(EventKind::RewardEarned))
        .await?;
    let mut matched_ids: HashSet<UserId> = HashSet::new();
    for event in &rewards {
        if let Some(timeline) = timelines.get(&event.user_id) {
            let window_start = timeline.signup.and_time(chrono::NaiveTime::MIN).and_utc();
            if event.timestamp <= window_start + Duration::hours(hours) {
                matched_ids.insert(event.user_id);
            }
        }
    }

    let mut matched: Vec<&UserTimeline> = Vec::new();
    let mut unmatched: Vec<&UserTimeline> = Vec::new();
    for (id, timeline) in timelines {
        if matched_ids.contains(id) {
            matched.push(timeline);
        } else {
            unmatched.push(timeline);
        }
    }

    let comparisons = request
        .horizons
        .iter()
        .map(|&horizon| {
            let matched_record = retention_records(
                &matched,
                &[horizon],
                request.definition,
                request.today,
            )
            .remove(0);
            let unmatched_record = retention_records(
                &unmatched,
                &[horizon],
                request.definition,
                request.today,
            )
            .remove(0);

            let rate_difference = match (matched_record.rate, unmatched_record.rate) {
                (Some(a), Some(b)) => Some(a - b),
                _ => None,
            };
            let chi_square = stats::chi_square_2x2([
                [
                    matched_record.retained,
                    matched_record.eligible - matched_record.retained,
                ],
                [
                    unmatched_record.retained,
                    unmatched_record.eligible - unmatched_record.retained,
                ],
            ]);
            let significant = chi_square.p_value < request.alpha;

            SplitComparison {
                horizon,
                matched: matched_record,
                unmatched: unmatched_record,
                rate_difference,
                chi_square,
                significant,
            }
        })
        .collect();

    Ok(SplitReport {
        split,
        alpha: request.alpha,
        comparisons,
    })
}
