//! Types for the job coordinator.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::SyncConfig;
use crate::job::JobStatus;
use crate::worker::WorkerId;

/// Errors that can occur during coordination.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A job with this id is already being distributed.
    #[error("job already distributed: {0}")]
    DuplicateJob(String),

    /// A job with no files cannot be distributed.
    #[error("job has no files: {0}")]
    EmptyJob(String),

    /// The coordinator task is gone.
    #[error("coordinator is not running")]
    Stopped,
}

/// Coordinator tuning.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// A job with queued batches and none in flight fails after this long.
    pub stall_timeout: Duration,
    /// How often stalled jobs are looked for.
    pub check_interval: Duration,
    /// Buffered events per subscriber before it lags.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(300),
            check_interval: Duration::from_secs(5),
            event_capacity: 1024,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_sync_config(config: &SyncConfig) -> Self {
        let stall_timeout = Duration::from_secs(config.stall_timeout_secs);
        Self {
            stall_timeout,
            check_interval: (stall_timeout / 10)
                .clamp(Duration::from_secs(1), Duration::from_secs(5)),
            ..Self::default()
        }
    }
}

/// Running counters of a distributed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub job_id: String,
    pub total_files: u64,
    pub synced_files: u64,
    pub failed_files: u64,
    pub total_batches: usize,
    pub completed_batches: usize,
    pub failed_batches: usize,
}

/// Final state of a job released by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(flatten)]
    pub counters: JobCounters,
    pub account_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A worker and the batch it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub worker_id: WorkerId,
    pub job_id: String,
    pub batch_index: usize,
}

/// Snapshot of the worker pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_workers: usize,
    pub available_workers: usize,
    pub active_jobs: usize,
    pub assignments: Vec<WorkerAssignment>,
}

/// Notifications published while jobs run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Progress {
        job_id: String,
        batch_index: usize,
        current_file: String,
        fraction_complete: f64,
    },
    BatchCompleted {
        job_id: String,
        batch_index: usize,
        synced: u64,
        failed: u64,
    },
    Error {
        job_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        batch_index: Option<usize>,
        message: String,
    },
    Completed(JobSummary),
}

impl SyncEvent {
    pub fn job_id(&self) -> &str {
        match self {
            SyncEvent::Progress { job_id, .. }
            | SyncEvent::BatchCompleted { job_id, .. }
            | SyncEvent::Error { job_id, .. } => job_id,
            SyncEvent::Completed(summary) => &summary.counters.job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_sync_config() {
        let sync = SyncConfig {
            stall_timeout_secs: 30,
            ..SyncConfig::default()
        };
        let config = CoordinatorConfig::from_sync_config(&sync);
        assert_eq!(config.stall_timeout, Duration::from_secs(30));
        assert_eq!(config.check_interval, Duration::from_secs(3));

        let config = CoordinatorConfig::from_sync_config(&SyncConfig::default());
        assert_eq!(config.check_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_completed_event_json() {
        let event = SyncEvent::Completed(JobSummary {
            counters: JobCounters {
                job_id: "job-1".into(),
                total_files: 3,
                synced_files: 3,
                failed_files: 0,
                total_batches: 1,
                completed_batches: 1,
                failed_batches: 0,
            },
            account_id: "acct".into(),
            status: JobStatus::Completed,
            error_message: None,
        });
        assert_eq!(event.job_id(), "job-1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["synced_files"], 3);
    }
}
