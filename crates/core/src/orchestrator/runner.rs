//! Single-process orchestrator implementation.
//!
//! Runs a whole job inside the calling task: the files of a batch are
//! transferred concurrently, batches run one after another with a short
//! pause between them.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::coordinator::{JobCounters, JobSummary, SyncEvent};
use crate::credentials::CredentialStore;
use crate::destination::DestinationConnector;
use crate::job::{
    create_batches, tally, JobStatus, JobStatusUpdate, JobStore, LogLevel, SyncLogEntry,
    TransferOutcome, TransferResult,
};
use crate::metrics;
use crate::transfer::{SourceFetcher, TransferPipeline};

use super::types::{LocalJob, OrchestratorError};

/// Runs jobs in this process without the worker pool.
pub struct LocalOrchestrator {
    job_store: Arc<dyn JobStore>,
    credentials: Arc<dyn CredentialStore>,
    fetcher: Arc<dyn SourceFetcher>,
    connector: Arc<dyn DestinationConnector>,
    events: Option<broadcast::Sender<SyncEvent>>,
}

impl LocalOrchestrator {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        credentials: Arc<dyn CredentialStore>,
        fetcher: Arc<dyn SourceFetcher>,
        connector: Arc<dyn DestinationConnector>,
    ) -> Self {
        Self {
            job_store,
            credentials,
            fetcher,
            connector,
            events: None,
        }
    }

    /// Publish batch and completion events on `events`.
    pub fn with_events(mut self, events: broadcast::Sender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Transfer every file of `job` and record its final status.
    ///
    /// Counters are written after each batch, the terminal status once at
    /// the end. Setup errors are returned without touching the job.
    pub async fn run(&self, job: LocalJob) -> Result<JobSummary, OrchestratorError> {
        let config = self.credentials.destination_config(&job.account_id)?;
        let destination = self.connector.connect(&config)?;
        let pipeline = TransferPipeline::new(Arc::clone(&self.fetcher), destination);

        let total_files = job.files.len() as u64;
        let batches = create_batches(job.files, job.config.batch_size);
        let total_batches = batches.len();
        let delay = job.config.batch_delay();
        info!(
            job_id = %job.job_id,
            files = total_files,
            batches = total_batches,
            batch_size = job.config.batch_size,
            "Running sync job in process"
        );

        let mut synced_files = 0;
        let mut failed_files = 0;
        for batch in batches {
            let results: Vec<TransferResult> = join_all(
                batch
                    .files
                    .iter()
                    .map(|file| pipeline.transfer_file(file, &job.config.options)),
            )
            .await;

            for result in &results {
                self.log_result(&job.job_id, result);
            }
            let (synced, failed) = tally(&results);
            synced_files += synced;
            failed_files += failed;
            metrics::BATCHES_RESOLVED
                .with_label_values(&["completed"])
                .inc();
            debug!(
                job_id = %job.job_id,
                batch_index = batch.index,
                synced,
                failed,
                "Local batch finished"
            );
            self.emit(SyncEvent::BatchCompleted {
                job_id: job.job_id.clone(),
                batch_index: batch.index,
                synced,
                failed,
            });

            let is_last = batch.index + 1 == total_batches;
            if !is_last {
                let update = JobStatusUpdate::new(JobStatus::Running)
                    .with_counts(synced_files, failed_files);
                if let Err(e) = self.job_store.update_job_status(&job.job_id, update) {
                    warn!(job_id = %job.job_id, error = %e, "Failed to update job counters");
                }
                tokio::time::sleep(delay).await;
            }
        }

        let status = JobStatus::finished(synced_files, failed_files, total_files > 0);
        let summary = JobSummary {
            counters: JobCounters {
                job_id: job.job_id.clone(),
                total_files,
                synced_files,
                failed_files,
                total_batches,
                completed_batches: total_batches,
                failed_batches: 0,
            },
            account_id: job.account_id,
            status,
            error_message: None,
        };
        self.finish(&summary);
        Ok(summary)
    }

    fn log_result(&self, job_id: &str, result: &TransferResult) {
        let entry = match &result.outcome {
            TransferOutcome::Success { destination_url } => {
                SyncLogEntry::new(job_id, LogLevel::Success, destination_url)
            }
            TransferOutcome::Failed { .. } => SyncLogEntry::new(
                job_id,
                LogLevel::Error,
                result.tagged_error().unwrap_or_default(),
            ),
        };
        if let Err(e) = self.job_store.append_sync_log(entry.for_file(&result.file)) {
            warn!(job_id = %job_id, error = %e, "Failed to append sync log");
        }
    }

    fn finish(&self, summary: &JobSummary) {
        let job_id = &summary.counters.job_id;
        let update = JobStatusUpdate::new(summary.status)
            .with_counts(summary.counters.synced_files, summary.counters.failed_files);
        if let Err(e) = self.job_store.update_job_status(job_id, update) {
            warn!(job_id = %job_id, error = %e, "Failed to record final job status");
        }
        let message = format!(
            "Sync finished: {} synced, {} failed",
            summary.counters.synced_files, summary.counters.failed_files
        );
        if let Err(e) =
            self.job_store
                .append_sync_log(SyncLogEntry::new(job_id, LogLevel::Info, message))
        {
            warn!(job_id = %job_id, error = %e, "Failed to append sync log");
        }

        metrics::JOBS_FINISHED
            .with_label_values(&[summary.status.as_str(), "single_process"])
            .inc();
        info!(
            job_id = %job_id,
            status = %summary.status,
            synced = summary.counters.synced_files,
            failed = summary.counters.failed_files,
            "Local sync finished"
        );
        self.emit(SyncEvent::Completed(summary.clone()));
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    use crate::job::{CreateJobRequest, FailureCategory, SqliteJobStore};
    use crate::orchestrator::OrchestratorConfig;
    use crate::testing::{fixtures, MockDestination, MockFetcher};
    use crate::transfer::{TransferError, TransferOptions};

    struct Harness {
        store: Arc<SqliteJobStore>,
        fetcher: MockFetcher,
        destination: MockDestination,
        orchestrator: LocalOrchestrator,
        job_id: String,
    }

    async fn harness() -> Harness {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let job = store
            .create_job(CreateJobRequest {
                account_id: fixtures::ACCOUNT_ID.to_string(),
                range: fixtures::date_range(),
            })
            .unwrap();
        store
            .update_job_status(&job.id, JobStatusUpdate::new(JobStatus::Running))
            .unwrap();

        let fetcher = MockFetcher::new();
        let destination = MockDestination::new();
        let orchestrator = LocalOrchestrator::new(
            store.clone(),
            Arc::new(fixtures::credentials()),
            Arc::new(fetcher.clone()),
            Arc::new(destination.clone()),
        );
        Harness {
            store,
            fetcher,
            destination,
            orchestrator,
            job_id: job.id,
        }
    }

    fn local_job(job_id: &str, files: usize, batch_size: usize) -> LocalJob {
        LocalJob {
            job_id: job_id.to_string(),
            account_id: fixtures::ACCOUNT_ID.to_string(),
            files: fixtures::file_descriptors(files),
            config: OrchestratorConfig {
                batch_size,
                options: TransferOptions::default(),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_sequentially_with_delay() {
        let h = harness().await;
        let job = local_job(&h.job_id, 7, 3);
        h.fetcher.serve_files(&job.files).await;

        let started = Instant::now();
        let summary = h.orchestrator.run(job).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(summary.status, JobStatus::Completed);
        assert_eq!(summary.counters.synced_files, 7);
        assert_eq!(summary.counters.total_batches, 3);
        // two gaps of 1500ms, none after the last batch
        assert_eq!(elapsed, Duration::from_millis(3000));

        let offsets: Vec<u128> = h
            .destination
            .all_attempt_times()
            .await
            .iter()
            .map(|t| t.duration_since(started).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 0, 0, 1500, 1500, 1500, 3000]);
    }

    #[tokio::test]
    async fn test_failures_recorded_and_siblings_continue() {
        let h = harness().await;
        let job = local_job(&h.job_id, 3, 3);
        // file-001 is not served and answers 404
        h.fetcher.serve_files(&job.files[..1]).await;
        h.fetcher.serve_files(&job.files[2..]).await;

        let summary = h.orchestrator.run(job).await.unwrap();
        assert_eq!(summary.status, JobStatus::CompletedWithErrors);
        assert_eq!(summary.counters.synced_files, 2);
        assert_eq!(summary.counters.failed_files, 1);

        let stored = h.store.get_job(&h.job_id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::CompletedWithErrors);
        assert_eq!(stored.synced_files, 2);
        assert_eq!(stored.failed_files, 1);

        let logs = h.store.sync_logs(&h.job_id).unwrap();
        let error = logs
            .iter()
            .find(|l| l.file_name.as_deref() == Some("file-001"))
            .unwrap();
        assert_eq!(error.level, LogLevel::Error);
        assert!(error
            .message
            .starts_with(&format!("[{}]", FailureCategory::ClientError.label())));
        assert!(logs
            .iter()
            .any(|l| l.level == LogLevel::Info && l.message.contains("2 synced, 1 failed")));
    }

    #[tokio::test]
    async fn test_every_file_failing_marks_job_failed_with_errors() {
        let h = harness().await;
        let job = local_job(&h.job_id, 2, 3);
        h.fetcher.serve_files(&job.files).await;
        for file in &job.files {
            h.destination
                .fail_always(
                    &format!("{}.jpg", file.public_id),
                    TransferError::from_status(403, "Forbidden"),
                )
                .await;
        }

        let summary = h.orchestrator.run(job).await.unwrap();
        assert_eq!(summary.counters.failed_files, 2);
        assert_eq!(summary.status, JobStatus::CompletedWithErrors);
    }

    #[tokio::test]
    async fn test_missing_destination_is_setup_error() {
        let h = harness().await;
        let credentials = fixtures::credentials();
        credentials.remove_destination(fixtures::ACCOUNT_ID);
        let orchestrator = LocalOrchestrator::new(
            h.store.clone(),
            Arc::new(credentials),
            Arc::new(h.fetcher.clone()),
            Arc::new(h.destination.clone()),
        );

        let result = orchestrator.run(local_job(&h.job_id, 2, 3)).await;
        assert!(matches!(result, Err(OrchestratorError::Credentials(_))));
        assert!(h.fetcher.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_events_published() {
        let h = harness().await;
        let (tx, mut rx) = broadcast::channel(16);
        let orchestrator = LocalOrchestrator::new(
            h.store.clone(),
            Arc::new(fixtures::credentials()),
            Arc::new(h.fetcher.clone()),
            Arc::new(h.destination.clone()),
        )
        .with_events(tx);
        let job = local_job(&h.job_id, 1, 3);
        h.fetcher.serve_files(&job.files).await;

        orchestrator.run(job).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            SyncEvent::BatchCompleted {
                synced: 1,
                failed: 0,
                ..
            }
        ));
        match rx.recv().await.unwrap() {
            SyncEvent::Completed(summary) => assert_eq!(summary.status, JobStatus::Completed),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
