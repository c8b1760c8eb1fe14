//! Analytics engine facade
//!
//! Owns the event store and runs the three analyses against the same
//! immutable snapshot. All run parameters travel in an explicit
//! [`RunConfig`]; nothing is cached between runs and no module-level state
//! exists, so two runs with the same snapshot and config produce the same
//! report apart from its timestamp.

use chrono::{NaiveDate, Utc};

use pulse_store::{EventStore, UserFilter};

use crate::abtest::{self, TestResult, DEFAULT_ALPHA};
use crate::error::Result;
use crate::report::{AnalysisReport, ReportBuilder};
use crate::retention::{self, RetentionReport, RetentionRequest, SplitBy};
use crate::segment::{self, SegmentConfig, SegmentationReport};

/// Parameters for one analysis run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Snapshot date; censoring and feature windows are evaluated against it
    pub today: NaiveDate,
    /// Significance level for every hypothesis test in the run
    pub alpha: f64,
    /// Retention computation parameters
    pub retention: RetentionRequest,
    /// Segmentation parameters
    pub segmentation: SegmentConfig,
}

impl RunConfig {
    /// Defaults: all horizons with weekly cohorts and a 24h reward split,
    /// alpha 0.05, k in 2..=7 with seed 42
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            alpha: DEFAULT_ALPHA,
            retention: RetentionRequest::new(today).with_split(SplitBy::RewardWithin { hours: 24 }),
            segmentation: SegmentConfig::new(today),
        }
    }

    /// Set the significance level for all tests
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self.retention.alpha = alpha;
        self.segmentation.alpha = alpha;
        self
    }

    /// Replace the retention request
    ///
    /// The run's snapshot date and alpha take precedence over whatever the
    /// request carries; every sub-analysis sees the same values.
    pub fn with_retention(mut self, retention: RetentionRequest) -> Self {
        self.retention = retention;
        self.retention.today = self.today;
        self.retention.alpha = self.alpha;
        self
    }

    /// Replace the segmentation config
    ///
    /// The run's snapshot date and alpha take precedence over whatever the
    /// config carries; every sub-analysis sees the same values.
    pub fn with_segmentation(mut self, segmentation: SegmentConfig) -> Self {
        self.segmentation = segmentation;
        self.segmentation.today = self.today;
        self.segmentation.alpha = self.alpha;
        self
    }
}

/// Analytics engine bound to one event store
pub struct AnalyticsEngine {
    store: Box<dyn EventStore>,
}

impl AnalyticsEngine {
    /// Create an engine over a store
    pub fn new(store: Box<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Get a reference to the underlying store
    pub fn store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    /// Compute cohort retention
    pub async fn retention(&self, config: &RunConfig) -> Result<RetentionReport> {
        retention::compute_retention(self.store.as_ref(), &config.retention).await
    }

    /// Evaluate the A/B test from the store's experiment assignments
    pub async fn ab_test(&self, config: &RunConfig) -> Result<TestResult> {
        let (control, treatment) = abtest::conversion_samples(self.store.as_ref()).await?;
        abtest::evaluate_ab_test(control, treatment, config.alpha)
    }

    /// Segment users by behavioral features
    pub async fn segmentation(&self, config: &RunConfig) -> Result<SegmentationReport> {
        segment::segment_users(self.store.as_ref(), &config.segmentation).await
    }

    /// Run all three analyses and assemble the versioned report
    ///
    /// Sub-analyses are independent; any failure propagates immediately
    /// (fail-fast, no partial report is ever emitted).
    pub async fn run_all(&self, config: &RunConfig) -> Result<AnalysisReport> {
        tracing::debug!(store = self.store.name(), today = %config.today, "starting analysis run");

        let retention = self.retention(config).await?;
        let ab_test = self.ab_test(config).await?;
        let segmentation = self.segmentation(config).await?;

        let total_users = self.store.users(&UserFilter::all()).await?.len() as u64;

        let report = ReportBuilder::new()
            .with_retention(retention)
            .with_ab_test(ab_test)
            .with_segmentation(segmentation)
            .with_expected_users(total_users)
            .build(Utc::now())?;

        tracing::debug!(version = report.version, "analysis run complete");
        Ok(report)
    }
}
