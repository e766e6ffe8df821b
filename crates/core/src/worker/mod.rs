//! Sync workers.
//!
//! A worker owns an inbox of [`BatchAssignment`]s and reports back through a
//! shared [`WorkerReport`] channel. It never touches coordinator state.

mod messages;
mod processor;
mod runner;

pub use messages::{BatchAssignment, ProgressUpdate, WorkerId, WorkerMessage, WorkerReport};
pub use processor::{BatchError, BatchProcessor};
pub use runner::run_worker;
