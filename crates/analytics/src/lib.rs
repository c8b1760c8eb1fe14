//! Pulse Analytics Engine
//!
//! Decision-grade product metrics over a fixed event log.
//!
//! # Overview
//!
//! This crate is the analytical core of Pulse, built on top of `pulse-store`.
//! It computes three independent artifacts from the same immutable snapshot:
//!
//! - **Retention**: per-cohort retention curves (D1..D30) with censoring,
//!   plus reward-impact comparisons
//! - **A/B testing**: two-proportion z-test, chi-square cross-check, effect
//!   size, confidence interval, post-hoc power
//! - **Segmentation**: behavioral feature extraction, seeded k-means
//!   clustering, cluster diagnostics, heterogeneous treatment effects
//!
//! and merges them into one versioned [`AnalysisReport`] for consumers.
//!
//! # Usage
//!
//! ```ignore
//! use pulse_analytics::{AnalyticsEngine, RunConfig};
//!
//! let engine = AnalyticsEngine::new(Box::new(store));
//! let config = RunConfig::new(today);
//! let report = engine.run_all(&config).await?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! ```
//!
//! # Determinism
//!
//! Every source of randomness is an explicit `seed` in [`RunConfig`];
//! identical snapshot + config produces a bit-identical report apart from
//! the `generated_at` timestamp.

pub mod abtest;
pub mod engine;
pub mod error;
pub mod report;
pub mod retention;
pub mod segment;
pub mod stats;

#[cfg(test)]
mod report_test;
#[cfg(test)]
mod segment_test;

// Re-exports for convenience
pub use abtest::{evaluate_ab_test, GroupSample, Recommendation, TestResult};
pub use engine::{AnalyticsEngine, RunConfig};
pub use error::{AnalyticsError, Result};
pub use report::{AnalysisReport, ReportBuilder, REPORT_VERSION};
pub use retention::{
    CohortKey, Horizon, RetentionDefinition, RetentionRecord, RetentionReport, RetentionRequest,
    SplitBy,
};
pub use segment::{
    FeatureSchema, FeatureTable, KDiagnostic, KSelection, SegmentConfig, SegmentationReport,
    SelectionRule,
};
