//! Sync jobs: data model and durable storage.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{
    CreateJobRequest, JobFilter, JobStatusUpdate, JobStore, LogLevel, StoreError, SyncLogEntry,
};
pub use types::{
    create_batches, tally, total_batches, Batch, DateRange, FailureCategory, FileDescriptor,
    JobStatus, SyncJob, TransferOutcome, TransferResult,
};
