//! Pulse Model - source data model for the Pulse analytics engine
//!
//! Defines the three source collections the engine reads:
//!
//! - **Users**: one record per signup, immutable after creation
//! - **Events**: append-only behavior log (app opens, rewards, activities)
//! - **Assignments**: experiment group membership and conversion outcome
//!
//! All types are plain serde-serializable data. Validation of the
//! record-level invariants (event timestamps never precede signup,
//! conversion timestamps exist iff the user converted) lives here so every
//! store implementation enforces the same rules.

pub mod assignment;
pub mod event;
pub mod user;

pub use assignment::{ExperimentAssignment, Group};
pub use event::{EventKind, EventRecord};
pub use user::{Channel, User, UserId};

use thiserror::Error;

/// Record-level validation errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// Event timestamp precedes the owning user's signup date
    #[error("event {event_id} for user {user_id} predates signup")]
    EventBeforeSignup {
        /// Offending event id
        event_id: u64,
        /// Owning user id
        user_id: UserId,
    },

    /// Negative value attached to an event
    #[error("event {event_id} has negative value {value}")]
    NegativeEventValue {
        /// Offending event id
        event_id: u64,
        /// The negative value
        value: f64,
    },

    /// Conversion timestamp present/absent inconsistently with the flag
    #[error("assignment for user {0} has inconsistent conversion state")]
    InconsistentConversion(UserId),
}

/// Result type for model validation
pub type Result<T> = std::result::Result<T, ModelError>;
