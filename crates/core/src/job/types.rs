//! Core data model for sync jobs.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a sync job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, source file list not yet known.
    Pending,
    /// Total file count is known and files are being transferred.
    Running,
    /// Finished with zero failed files.
    Completed,
    /// Finished, but at least one file failed.
    CompletedWithErrors,
    /// Could not start, or was aborted.
    Failed,
}

impl JobStatus {
    /// Database/API representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "completed_with_errors" => Some(JobStatus::CompletedWithErrors),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Whether the job has reached its final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithErrors | JobStatus::Failed
        )
    }

    /// Whether the job still occupies its account (at most one per account).
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Final status for a job that attempted its files.
    ///
    /// `files_attempted` is false when every batch failed during setup, before
    /// any file transfer was tried.
    pub fn finished(synced_files: u64, failed_files: u64, files_attempted: bool) -> Self {
        if failed_files == 0 {
            JobStatus::Completed
        } else if synced_files == 0 && !files_attempted {
            JobStatus::Failed
        } else {
            JobStatus::CompletedWithErrors
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive calendar date range used to select source files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// First instant of the range (`start` at midnight UTC).
    pub fn start_datetime(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(NaiveTime::MIN))
    }

    /// Last instant of the range (`end` at 23:59:59.999 UTC).
    pub fn end_datetime(&self) -> DateTime<Utc> {
        let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        Utc.from_utc_datetime(&self.end.and_time(last))
    }
}

/// A durable sync job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: String,
    pub account_id: String,
    pub range: DateRange,
    pub status: JobStatus,
    pub total_files: u64,
    pub synced_files: u64,
    pub failed_files: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncJob {
    /// Percentage of files resolved (synced or failed), rounded.
    pub fn progress_percent(&self) -> u8 {
        if self.total_files == 0 {
            return 0;
        }
        let done = (self.synced_files + self.failed_files) as f64;
        ((done / self.total_files as f64) * 100.0)
            .round()
            .min(100.0) as u8
    }
}

/// A remote object produced by the source lister.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Source object identifier.
    pub public_id: String,
    /// Where the bytes can be downloaded from.
    pub source_url: String,
    /// Size in bytes as reported by the source.
    #[serde(default)]
    pub bytes: u64,
    /// Format tag (file extension without the dot).
    #[serde(default)]
    pub format: String,
}

/// A contiguous slice of a job's files, assigned as one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based index, unique within a job.
    pub index: usize,
    pub files: Vec<FileDescriptor>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Number of batches needed for `total_files` at `batch_size` files each.
pub fn total_batches(total_files: usize, batch_size: usize) -> usize {
    total_files.div_ceil(batch_size.max(1))
}

/// Split files into contiguous batches of at most `batch_size`.
///
/// Every file lands in exactly one batch and order is preserved.
pub fn create_batches(files: Vec<FileDescriptor>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(total_batches(files.len(), batch_size));
    let mut iter = files.into_iter().peekable();
    let mut index = 0;
    while iter.peek().is_some() {
        let files: Vec<_> = iter.by_ref().take(batch_size).collect();
        batches.push(Batch { index, files });
        index += 1;
    }
    batches
}

/// Failure classification for a transfer step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Timeout,
    Network,
    ClientError,
    ServerError,
    Unknown,
}

impl FailureCategory {
    /// Human-readable tag used as the log line prefix.
    pub fn label(&self) -> &'static str {
        match self {
            FailureCategory::Timeout => "Timeout",
            FailureCategory::Network => "Network",
            FailureCategory::ClientError => "Client Error",
            FailureCategory::ServerError => "Server Error",
            FailureCategory::Unknown => "Unknown",
        }
    }

    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Timeout => "timeout",
            FailureCategory::Network => "network",
            FailureCategory::ClientError => "client_error",
            FailureCategory::ServerError => "server_error",
            FailureCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of transferring one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferOutcome {
    Success {
        destination_url: String,
    },
    Failed {
        category: FailureCategory,
        message: String,
    },
}

/// Per-file result reported by workers and the single-process runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferResult {
    /// Source object identifier of the file.
    pub file: String,
    #[serde(flatten)]
    pub outcome: TransferOutcome,
}

impl TransferResult {
    pub fn success(file: impl Into<String>, destination_url: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            outcome: TransferOutcome::Success {
                destination_url: destination_url.into(),
            },
        }
    }

    pub fn failure(
        file: impl Into<String>,
        category: FailureCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            outcome: TransferOutcome::Failed {
                category,
                message: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Success { .. })
    }

    pub fn destination_url(&self) -> Option<&str> {
        match &self.outcome {
            TransferOutcome::Success { destination_url } => Some(destination_url),
            TransferOutcome::Failed { .. } => None,
        }
    }

    pub fn category(&self) -> Option<FailureCategory> {
        match &self.outcome {
            TransferOutcome::Success { .. } => None,
            TransferOutcome::Failed { category, .. } => Some(*category),
        }
    }

    /// Error message tagged with its category, e.g. `[Timeout] ...`.
    pub fn tagged_error(&self) -> Option<String> {
        match &self.outcome {
            TransferOutcome::Success { .. } => None,
            TransferOutcome::Failed { category, message } => {
                Some(format!("[{}] {}", category.label(), message))
            }
        }
    }
}

/// Count successes and failures in a result list.
pub fn tally(results: &[TransferResult]) -> (u64, u64) {
    let synced = results.iter().filter(|r| r.is_success()).count() as u64;
    (synced, results.len() as u64 - synced)
}
