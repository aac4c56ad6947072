//! Service layer
//!
//! Services contain the business logic of the runner:
//! - execution: the per-job state machine driven by the reconciler
//! - sync: how the status cache refreshes tracked queries
//! - admission: the in-memory routing group quota pool
//!
//! Collaborators are passed in as trait objects to enable testing with fakes.

mod admission;
mod execution;
mod sync;

pub use execution::{
    ExecutionError, ExecutionService, StatusCache, abort, finalize, get_allocation_token,
    kick_off_query, monitor_query,
};

pub use admission::PooledAdmissionController;
pub use execution::QueryExecutor;
pub use sync::ResourceSyncer;
