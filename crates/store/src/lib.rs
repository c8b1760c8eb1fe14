//! Pulse Store - event store adapter for the Pulse analytics engine
//!
//! The engine never talks to a database directly. It reads three collections
//! (users, events, experiment assignments) through the [`EventStore`] trait,
//! addressable by simple filter predicates. Production deployments implement
//! the trait over their warehouse of choice; [`MemoryStore`] serves tests and
//! hosts that already hold the snapshot in memory.
//!
//! # Usage
//!
//! ```ignore
//! use pulse_store::{EventFilter, EventStore, MemoryStore};
//!
//! let store = MemoryStore::new(users, events, assignments)?;
//! let rewards = store
//!     .events(&EventFilter::all().with_kind(EventKind::RewardEarned))
//!     .await?;
//! ```

pub mod error;
pub mod filter;
pub mod memory;

pub use error::{Result, StoreError};
pub use filter::{AssignmentFilter, DateRange, EventFilter, UserFilter};
pub use memory::MemoryStore;

use async_trait::async_trait;

use pulse_model::{EventRecord, ExperimentAssignment, User};

/// Read-only access to the three source collections
///
/// All methods take a filter predicate and return matching records. A run of
/// the analytics engine treats the store as an immutable snapshot; no method
/// mutates state.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fetch users matching the filter
    async fn users(&self, filter: &UserFilter) -> Result<Vec<User>>;

    /// Fetch events matching the filter
    async fn events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>>;

    /// Fetch experiment assignments matching the filter
    async fn assignments(&self, filter: &AssignmentFilter) -> Result<Vec<ExperimentAssignment>>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}
