//! Sync service: validates requests, lists source files, and runs each job
//! locally or on the worker pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::coordinator::{
    ClusterStats, JobCounters, JobSpec, JobSummary, SyncCoordinator, SyncEvent,
};
use crate::credentials::CredentialStore;
use crate::destination::DestinationConnector;
use crate::job::{
    CreateJobRequest, JobFilter, JobStatus, JobStatusUpdate, JobStore, LogLevel, SyncJob,
    SyncLogEntry,
};
use crate::metrics;
use crate::orchestrator::{LocalJob, LocalOrchestrator, OrchestratorConfig};
use crate::source::{list_files_in_range, ListingLimits, SourceConnector};
use crate::transfer::{SourceFetcher, TransferOptions};

use super::types::{
    SyncError, SyncMode, SyncProgress, SyncReport, SyncRequest, MAX_WORKERS_PER_JOB,
    NO_FILES_MESSAGE,
};

/// Entry point for starting and inspecting sync jobs.
#[derive(Clone)]
pub struct SyncService {
    config: SyncConfig,
    job_store: Arc<dyn JobStore>,
    credentials: Arc<dyn CredentialStore>,
    sources: Arc<dyn SourceConnector>,
    local: Arc<LocalOrchestrator>,
    coordinator: Option<SyncCoordinator>,
    events: broadcast::Sender<SyncEvent>,
    /// Serializes the active-job check with job creation.
    start_lock: Arc<Mutex<()>>,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        job_store: Arc<dyn JobStore>,
        credentials: Arc<dyn CredentialStore>,
        sources: Arc<dyn SourceConnector>,
        fetcher: Arc<dyn SourceFetcher>,
        destinations: Arc<dyn DestinationConnector>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        let local = LocalOrchestrator::new(
            Arc::clone(&job_store),
            Arc::clone(&credentials),
            fetcher,
            destinations,
        )
        .with_events(events.clone());

        Self {
            config,
            job_store,
            credentials,
            sources,
            local: Arc::new(local),
            coordinator: None,
            events,
            start_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Distribute large jobs through `coordinator`.
    pub fn with_coordinator(mut self, coordinator: SyncCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Validate the request, create the job, and run it in the background.
    ///
    /// Returns the `pending` job as soon as it is recorded.
    pub async fn start_sync(&self, request: SyncRequest) -> Result<SyncJob, SyncError> {
        let job = self.create_job(&request).await?;

        let service = self.clone();
        let background = job.clone();
        tokio::spawn(async move {
            if let Err(e) = service.execute(&background, &request).await {
                warn!(job_id = %background.id, error = %e, "Background sync failed");
            }
        });

        Ok(job)
    }

    /// Validate the request, create the job, and run it to completion.
    pub async fn run_sync(&self, request: SyncRequest) -> Result<SyncReport, SyncError> {
        let job = self.create_job(&request).await?;
        self.execute(&job, &request).await
    }

    /// Job record with its log lines and percent done.
    pub fn get_sync_progress(&self, job_id: &str) -> Result<SyncProgress, SyncError> {
        let job = self
            .job_store
            .get_job(job_id)?
            .ok_or_else(|| SyncError::NotFound(job_id.to_string()))?;
        let logs = self.job_store.sync_logs(job_id)?;
        let percent = job.progress_percent();
        Ok(SyncProgress { job, logs, percent })
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<SyncJob>, SyncError> {
        Ok(self.job_store.list_jobs(filter)?)
    }

    /// Worker pool snapshot, `None` when distribution is disabled.
    pub async fn cluster_stats(&self) -> Result<Option<ClusterStats>, SyncError> {
        match &self.coordinator {
            Some(coordinator) => Ok(Some(coordinator.stats().await?)),
            None => Ok(None),
        }
    }

    /// Fail a distributed job now. Returns false for jobs not on the pool.
    pub async fn abandon(&self, job_id: &str, reason: &str) -> Result<bool, SyncError> {
        if self.job_store.get_job(job_id)?.is_none() {
            return Err(SyncError::NotFound(job_id.to_string()));
        }
        match &self.coordinator {
            Some(coordinator) => Ok(coordinator.abandon(job_id, reason).await?),
            None => Ok(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    async fn create_job(&self, request: &SyncRequest) -> Result<SyncJob, SyncError> {
        validate_range(request, Utc::now().date_naive())?;

        let _guard = self.start_lock.lock().await;
        if !self.job_store.active_jobs(&request.account_id)?.is_empty() {
            return Err(SyncError::AlreadyRunning);
        }
        let job = self.job_store.create_job(CreateJobRequest {
            account_id: request.account_id.clone(),
            range: request.range,
        })?;
        info!(
            job_id = %job.id,
            account_id = %job.account_id,
            start = %job.range.start,
            end = %job.range.end,
            "Sync job created"
        );
        Ok(job)
    }

    /// Run a created job. Any error before transfers start fails the job.
    async fn execute(&self, job: &SyncJob, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        match self.transfer_job(job, request).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.fail_job(job, &e.to_string());
                Err(e)
            }
        }
    }

    async fn transfer_job(
        &self,
        job: &SyncJob,
        request: &SyncRequest,
    ) -> Result<SyncReport, SyncError> {
        // checked up front so a misconfigured account fails before listing
        self.credentials.destination_config(&job.account_id)?;
        let source = self.credentials.source_config(&job.account_id)?;
        let lister = self.sources.connect(&source)?;

        let limits = ListingLimits {
            max_pages: self.config.max_list_pages,
            page_delay: Duration::from_millis(self.config.list_page_delay_ms),
        };
        let files = list_files_in_range(lister.as_ref(), &job.range, &limits).await?;

        if files.is_empty() {
            return Ok(self.finish_empty(job));
        }

        let total_files = files.len() as u64;
        self.job_store.update_job_status(
            &job.id,
            JobStatusUpdate::new(JobStatus::Running).with_total(total_files),
        )?;
        self.append_log(SyncLogEntry::new(
            &job.id,
            LogLevel::Info,
            format!("Found {} files to sync", total_files),
        ));

        let options = self.transfer_options(request);
        if let Some(coordinator) = self.distribution_target(files.len()).await {
            let max_workers = request
                .max_workers
                .unwrap_or(self.config.max_workers)
                .clamp(1, MAX_WORKERS_PER_JOB);
            let spec = JobSpec {
                job_id: job.id.clone(),
                account_id: job.account_id.clone(),
                files,
                batch_size: self.config.worker_batch_size.max(1),
                options,
                max_workers,
            };
            info!(job_id = %job.id, files = total_files, max_workers, "Distributing sync job");
            let summary = coordinator.run_job(spec).await?;
            return Ok(report(SyncMode::Distributed, summary));
        }

        let mut config = OrchestratorConfig::from_sync_config(&self.config, options);
        if let Some(batch_size) = request.batch_size {
            config.batch_size = batch_size.clamp(1, 10);
        }
        let summary = self
            .local
            .run(LocalJob {
                job_id: job.id.clone(),
                account_id: job.account_id.clone(),
                files,
                config,
            })
            .await?;
        Ok(report(SyncMode::SingleProcess, summary))
    }

    /// The coordinator, if this job is large enough and workers exist.
    async fn distribution_target(&self, files: usize) -> Option<&SyncCoordinator> {
        let coordinator = self.coordinator.as_ref()?;
        if files <= self.config.distribution_threshold {
            return None;
        }
        match coordinator.stats().await {
            Ok(stats) if stats.total_workers > 0 => Some(coordinator),
            Ok(_) => {
                info!(files, "No sync workers registered, running in process");
                None
            }
            Err(e) => {
                warn!(error = %e, "Coordinator unavailable, running in process");
                None
            }
        }
    }

    fn transfer_options(&self, request: &SyncRequest) -> TransferOptions {
        TransferOptions::clamped(
            request
                .download_retries
                .unwrap_or(self.config.download_retries),
            request.upload_retries.unwrap_or(self.config.upload_retries),
            request
                .download_timeout_secs
                .unwrap_or(self.config.download_timeout_secs),
        )
    }

    fn finish_empty(&self, job: &SyncJob) -> SyncReport {
        let update = JobStatusUpdate::new(JobStatus::Completed)
            .with_total(0)
            .with_counts(0, 0)
            .with_error(NO_FILES_MESSAGE);
        if let Err(e) = self.job_store.update_job_status(&job.id, update) {
            warn!(job_id = %job.id, error = %e, "Failed to record final job status");
        }
        self.append_log(SyncLogEntry::new(&job.id, LogLevel::Info, NO_FILES_MESSAGE));
        metrics::JOBS_FINISHED
            .with_label_values(&[
                JobStatus::Completed.as_str(),
                SyncMode::SingleProcess.as_str(),
            ])
            .inc();
        info!(job_id = %job.id, "No files in range");

        let summary = summary_for(
            job,
            JobStatus::Completed,
            Some(NO_FILES_MESSAGE.to_string()),
        );
        let _ = self.events.send(SyncEvent::Completed(summary.clone()));
        report(SyncMode::SingleProcess, summary)
    }

    fn fail_job(&self, job: &SyncJob, message: &str) {
        error!(job_id = %job.id, error = %message, "Sync job failed");
        let update = JobStatusUpdate::new(JobStatus::Failed).with_error(message);
        if let Err(e) = self.job_store.update_job_status(&job.id, update) {
            warn!(job_id = %job.id, error = %e, "Failed to record job failure");
            return;
        }
        self.append_log(SyncLogEntry::new(
            &job.id,
            LogLevel::Error,
            format!("Sync failed: {}", message),
        ));
        metrics::JOBS_FINISHED
            .with_label_values(&[JobStatus::Failed.as_str(), "none"])
            .inc();

        let _ = self.events.send(SyncEvent::Error {
            job_id: job.id.clone(),
            batch_index: None,
            message: message.to_string(),
        });
        let _ = self.events.send(SyncEvent::Completed(summary_for(
            job,
            JobStatus::Failed,
            Some(message.to_string()),
        )));
    }

    fn append_log(&self, entry: SyncLogEntry) {
        if let Err(e) = self.job_store.append_sync_log(entry) {
            warn!(error = %e, "Failed to append sync log");
        }
    }
}

/// Reject ranges that are reversed, empty, or reach into the future.
fn validate_range(request: &SyncRequest, today: NaiveDate) -> Result<(), SyncError> {
    if request.account_id.trim().is_empty() {
        return Err(SyncError::InvalidRequest(
            "Account id is required".to_string(),
        ));
    }
    if request.range.start >= request.range.end {
        return Err(SyncError::InvalidRequest(
            "Start date must be before end date".to_string(),
        ));
    }
    if request.range.end > today {
        return Err(SyncError::InvalidRequest(
            "End date cannot be in the future".to_string(),
        ));
    }
    Ok(())
}

fn summary_for(job: &SyncJob, status: JobStatus, error_message: Option<String>) -> JobSummary {
    JobSummary {
        counters: JobCounters {
            job_id: job.id.clone(),
            total_files: 0,
            synced_files: 0,
            failed_files: 0,
            total_batches: 0,
            completed_batches: 0,
            failed_batches: 0,
        },
        account_id: job.account_id.clone(),
        status,
        error_message,
    }
}

fn report(mode: SyncMode, summary: JobSummary) -> SyncReport {
    SyncReport {
        job_id: summary.counters.job_id,
        mode,
        status: summary.status,
        total_files: summary.counters.total_files,
        synced_files: summary.counters.synced_files,
        failed_files: summary.counters.failed_files,
        total_batches: summary.counters.total_batches,
        error_message: summary.error_message,
    }
}
