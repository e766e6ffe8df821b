//! Distributed batch coordination.
//!
//! The coordinator splits a job's files into batches and hands them to idle
//! workers, one batch per worker at a time. A batch held by a lost worker
//! keeps its index and is reassigned. Jobs with queued batches and no worker
//! activity for the stall timeout are failed.

mod pool;
mod runner;
mod state;
mod types;

pub use pool::WorkerPool;
pub use runner::SyncCoordinator;
pub use state::{CoordinatorState, Dispatch, JobSpec, ReportOutcome, WorkerLoss, WorkerSlot};
pub use types::{
    ClusterStats, CoordinatorConfig, CoordinatorError, JobCounters, JobSummary, SyncEvent,
    WorkerAssignment,
};
