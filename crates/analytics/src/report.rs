//! Versioned analysis report assembly
//!
//! Merges the three analysis outputs into one timestamped artifact for the
//! presentation layer. The builder performs no computation; it only checks
//! that every sub-result is present and that they are mutually consistent
//! before emitting. The serde shape of [`AnalysisReport`] is the output
//! contract: adding fields is backward compatible, removing or renaming one
//! requires a version bump.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::abtest::TestResult;
use crate::error::{AnalyticsError, Result};
use crate::retention::RetentionReport;
use crate::segment::SegmentationReport;

/// Current report schema version
pub const REPORT_VERSION: u32 = 1;

/// The complete artifact of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Report schema version
    pub version: u32,
    /// When the report was assembled
    pub generated_at: DateTime<Utc>,
    /// Cohort retention analysis
    pub retention: RetentionReport,
    /// A/B test verdict
    pub ab_test: TestResult,
    /// Behavioral segmentation
    pub segmentation: SegmentationReport,
}

/// Builder validating sub-results before assembly
#[derive(Debug, Default)]
pub struct ReportBuilder {
    retention: Option<RetentionReport>,
    ab_test: Option<TestResult>,
    segmentation: Option<SegmentationReport>,
    expected_users: Option<u64>,
}

impl ReportBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the retention sub-result
    pub fn with_retention(mut self, retention: RetentionReport) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Attach the A/B test sub-result
    pub fn with_ab_test(mut self, ab_test: TestResult) -> Self {
        self.ab_test = Some(ab_test);
        self
    }

    /// Attach the segmentation sub-result
    pub fn with_segmentation(mut self, segmentation: SegmentationReport) -> Self {
        self.segmentation = Some(segmentation);
        self
    }

    /// Require the segmentation to cover exactly this many users
    pub fn with_expected_users(mut self, count: u64) -> Self {
        self.expected_users = Some(count);
        self
    }

    /// Validate and assemble the report
    ///
    /// Fails with `IncompleteAnalysis` when a sub-result is missing, when
    /// cluster sizes do not partition the segmented population, or when the
    /// segmented population differs from the expected user count.
    pub fn build(self, generated_at: DateTime<Utc>) -> Result<AnalysisReport> {
        let retention = self
            .retention
            .ok_or_else(|| AnalyticsError::IncompleteAnalysis("retention missing".to_string()))?;
        let ab_test = self
            .ab_test
            .ok_or_else(|| AnalyticsError::IncompleteAnalysis("ab_test missing".to_string()))?;
        let segmentation = self.segmentation.ok_or_else(|| {
            AnalyticsError::IncompleteAnalysis("segmentation missing".to_string())
        })?;

        let cluster_total: u64 = segmentation.clusters.iter().map(|c| c.size).sum();
        if cluster_total != segmentation.total_users {
            return Err(AnalyticsError::IncompleteAnalysis(format!(
                "cluster sizes sum to {cluster_total} but {} users were segmented",
                segmentation.total_users
            )));
        }
        if segmentation.assignments.len() as u64 != segmentation.total_users {
            return Err(AnalyticsError::IncompleteAnalysis(format!(
                "{} cluster assignments for {} users",
                segmentation.assignments.len(),
                segmentation.total_users
            )));
        }
        if let Some(expected) = self.expected_users {
            if segmentation.total_users != expected {
                return Err(AnalyticsError::IncompleteAnalysis(format!(
                    "segmented {} users, expected {expected}",
                    segmentation.total_users
                )));
            }
        }

        Ok(AnalysisReport {
            version: REPORT_VERSION,
            generated_at,
            retention,
            ab_test,
            segmentation,
        })
    }
}
