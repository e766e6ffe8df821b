//! Messages exchanged between the coordinator and workers.

use serde::{Deserialize, Serialize};

use crate::job::{FileDescriptor, TransferResult};
use crate::transfer::TransferOptions;

/// Identity of a sync worker, unique for the coordinator's lifetime.
pub type WorkerId = u64;

/// Coordinator → worker: process this batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAssignment {
    pub job_id: String,
    pub batch_index: usize,
    /// Account whose destination credentials the worker resolves.
    pub account_id: String,
    pub files: Vec<FileDescriptor>,
    pub options: TransferOptions,
}

/// Per-file progress inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub job_id: String,
    pub batch_index: usize,
    /// Source id of the file just finished.
    pub current_file: String,
    /// Fraction of the batch done, in `0.0..=1.0`.
    pub fraction_complete: f64,
}

/// Worker → coordinator messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The worker can take an assignment.
    Ready,
    BatchCompleted {
        job_id: String,
        batch_index: usize,
        results: Vec<TransferResult>,
    },
    /// The batch could not be processed at all.
    BatchFailed {
        job_id: String,
        batch_index: usize,
        error: String,
    },
    Progress(ProgressUpdate),
}

/// A message tagged with its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: WorkerId,
    pub message: WorkerMessage,
}

impl WorkerReport {
    pub fn new(worker_id: WorkerId, message: WorkerMessage) -> Self {
        Self { worker_id, message }
    }
}
