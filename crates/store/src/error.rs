//! Store error types

use thiserror::Error;

/// Errors that can occur while reading from an event store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying backend failed to execute the read
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Snapshot violates a record-level invariant
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] pulse_model::ModelError),

    /// Referenced user does not exist
    #[error("unknown user: {0}")]
    UnknownUser(pulse_model::UserId),

    /// I/O error from the backing source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
