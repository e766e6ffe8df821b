//! Job storage trait and types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DateRange, JobStatus, SyncJob};

/// Error type for job storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Job not found.
    #[error("sync job not found: {0}")]
    NotFound(String),

    /// The job already reached a terminal status.
    #[error("sync job {job_id} is already {status}")]
    Terminal { job_id: String, status: JobStatus },

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Request to create a new job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub account_id: String,
    pub range: DateRange,
}

/// Partial status update for a job.
///
/// Absent fields keep their stored value. Counters never move backwards.
#[derive(Debug, Clone)]
pub struct JobStatusUpdate {
    pub status: JobStatus,
    pub total_files: Option<u64>,
    pub synced_files: Option<u64>,
    pub failed_files: Option<u64>,
    pub error_message: Option<String>,
}

impl JobStatusUpdate {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            total_files: None,
            synced_files: None,
            failed_files: None,
            error_message: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total_files = Some(total);
        self
    }

    pub fn with_counts(mut self, synced: u64, failed: u64) -> Self {
        self.synced_files = Some(synced);
        self.failed_files = Some(failed);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Log level of a per-job log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => LogLevel::Success,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// One per-file (or per-job) log line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncLogEntry {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl SyncLogEntry {
    pub fn new(job_id: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            file_name: None,
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn for_file(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub account_id: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl JobFilter {
    pub fn new() -> Self {
        Self {
            account_id: None,
            status: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Trait for job storage backends.
pub trait JobStore: Send + Sync {
    /// Create a new job in `pending`.
    fn create_job(&self, request: CreateJobRequest) -> Result<SyncJob, StoreError>;

    /// Get a job by ID.
    fn get_job(&self, id: &str) -> Result<Option<SyncJob>, StoreError>;

    /// Apply a status update. Fails if the job is already terminal.
    fn update_job_status(&self, id: &str, update: JobStatusUpdate) -> Result<SyncJob, StoreError>;

    /// Append a log line for a job.
    fn append_sync_log(&self, entry: SyncLogEntry) -> Result<(), StoreError>;

    /// Log lines of a job, oldest first.
    fn sync_logs(&self, job_id: &str) -> Result<Vec<SyncLogEntry>, StoreError>;

    /// Jobs in `pending` or `running` for an account.
    fn active_jobs(&self, account_id: &str) -> Result<Vec<SyncJob>, StoreError>;

    /// List jobs matching the filter, newest first.
    fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<SyncJob>, StoreError>;
}
