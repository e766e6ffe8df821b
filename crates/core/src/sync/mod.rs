//! Sync jobs end to end.
//!
//! [`SyncService`] validates a request, records the job, lists the source
//! range, and runs the transfers in process or on the worker pool.

mod service;
mod types;

pub use service::SyncService;
pub use types::{
    SyncError, SyncMode, SyncProgress, SyncReport, SyncRequest, MAX_WORKERS_PER_JOB,
    NO_FILES_MESSAGE,
};
