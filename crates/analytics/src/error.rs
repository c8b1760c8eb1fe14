//! Analytics error types

use thiserror::Error;

/// Analytics errors
///
/// Failures are local to the computation that raised them: one undefined
/// metric never aborts sibling metrics. Only [`AnalyticsError::IncompleteAnalysis`],
/// raised during report assembly, is fatal to a whole run.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Too little data to compute the requested metric
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Malformed input (e.g. conversions exceeding sample size)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required sub-result is missing or inconsistent at aggregation time
    #[error("incomplete analysis: {0}")]
    IncompleteAnalysis(String),

    /// Event store read failed
    #[error("store error: {0}")]
    Store(#[from] pulse_store::StoreError),
}

/// Result type for analytics operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;
