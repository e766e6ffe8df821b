//! Sync request and result types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::CoordinatorError;
use crate::credentials::CredentialError;
use crate::job::{DateRange, JobStatus, StoreError, SyncJob, SyncLogEntry};
use crate::orchestrator::OrchestratorError;
use crate::source::ListerError;

/// Message recorded on a job whose range lists no files.
pub const NO_FILES_MESSAGE: &str = "No files found for the specified date range";

/// Most workers one job may hold, whatever the request asks for.
pub const MAX_WORKERS_PER_JOB: usize = 6;

/// Errors from the sync service.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request was rejected before a job was created.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Another sync job is already running")]
    AlreadyRunning,

    #[error("sync job not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("source listing failed: {0}")]
    Listing(#[from] ListerError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),
}

/// Request to sync one account's files in a date range.
///
/// Tuning fields left unset take the configured defaults; all of them are
/// clamped into their accepted bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub account_id: String,
    pub range: DateRange,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub download_retries: Option<u32>,
    #[serde(default)]
    pub upload_retries: Option<u32>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl SyncRequest {
    pub fn new(account_id: impl Into<String>, range: DateRange) -> Self {
        Self {
            account_id: account_id.into(),
            range,
            batch_size: None,
            download_retries: None,
            upload_retries: None,
            download_timeout_secs: None,
            max_workers: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_retries(mut self, download: u32, upload: u32) -> Self {
        self.download_retries = Some(download);
        self.upload_retries = Some(upload);
        self
    }

    pub fn with_download_timeout_secs(mut self, secs: u64) -> Self {
        self.download_timeout_secs = Some(secs);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }
}

/// Where a job's files were transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    SingleProcess,
    Distributed,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::SingleProcess => "single_process",
            SyncMode::Distributed => "distributed",
        }
    }
}

/// Outcome of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub job_id: String,
    pub mode: SyncMode,
    pub status: JobStatus,
    pub total_files: u64,
    pub synced_files: u64,
    pub failed_files: u64,
    pub total_batches: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Job record, its log, and percent done.
#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    pub job: SyncJob,
    pub logs: Vec<SyncLogEntry>,
    pub percent: u8,
}
