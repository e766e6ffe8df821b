//! Coordinator task and its handle.
//!
//! One task owns [`CoordinatorState`]. Workers talk to it only through
//! messages: assignments go out on a per-worker channel, reports come back on
//! one shared channel. Callers hold a cloneable [`SyncCoordinator`] handle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::job::{JobStatus, JobStatusUpdate, JobStore, LogLevel, SyncLogEntry, TransferOutcome};
use crate::metrics;
use crate::worker::{BatchAssignment, WorkerId, WorkerMessage, WorkerReport};

use super::state::{CoordinatorState, Dispatch, JobSpec};
use super::types::{ClusterStats, CoordinatorConfig, CoordinatorError, JobSummary, SyncEvent};

const COMMAND_CAPACITY: usize = 256;
const REPORT_CAPACITY: usize = 1024;
const INBOX_CAPACITY: usize = 2;

enum Command {
    AddWorker {
        worker_id: WorkerId,
        inbox: mpsc::Sender<BatchAssignment>,
        reply: oneshot::Sender<()>,
    },
    WorkerLost {
        worker_id: WorkerId,
    },
    StartJob {
        spec: JobSpec,
        done: Option<oneshot::Sender<JobSummary>>,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    Abandon {
        job_id: String,
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    Stats {
        reply: oneshot::Sender<ClusterStats>,
    },
}

/// Handle to the coordinator task.
#[derive(Clone)]
pub struct SyncCoordinator {
    commands: mpsc::Sender<Command>,
    reports: mpsc::Sender<WorkerReport>,
    events: broadcast::Sender<SyncEvent>,
    next_worker_id: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SyncCoordinator {
    /// Spawn the coordinator task. Events are published on `events`.
    pub fn spawn(
        config: CoordinatorConfig,
        job_store: Arc<dyn JobStore>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (reports, report_rx) = mpsc::channel(REPORT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = Arc::new(AtomicBool::new(true));

        let task = CoordinatorTask {
            config,
            state: CoordinatorState::new(),
            inboxes: HashMap::new(),
            waiters: HashMap::new(),
            job_store,
            events: events.clone(),
        };
        tokio::spawn(task.run(command_rx, report_rx, shutdown_rx, Arc::clone(&running)));

        Self {
            commands,
            reports,
            events,
            next_worker_id: Arc::new(AtomicU64::new(1)),
            running,
            shutdown_tx,
        }
    }

    /// Whether the coordinator task is still accepting commands.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a worker channel. The worker becomes available once it
    /// reports `Ready`.
    pub async fn register_worker(
        &self,
    ) -> Result<(WorkerId, mpsc::Receiver<BatchAssignment>), CoordinatorError> {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let (inbox, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (reply, reply_rx) = oneshot::channel();
        self.send(Command::AddWorker {
            worker_id,
            inbox,
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| CoordinatorError::Stopped)?;
        Ok((worker_id, inbox_rx))
    }

    /// Sender workers use for their reports.
    pub fn reporter(&self) -> mpsc::Sender<WorkerReport> {
        self.reports.clone()
    }

    /// Tell the coordinator a worker exited or crashed.
    pub async fn worker_lost(&self, worker_id: WorkerId) {
        let _ = self.send(Command::WorkerLost { worker_id }).await;
    }

    /// Start distributing a job. Returns once the first batches are assigned.
    pub async fn start_distributed_sync(&self, spec: JobSpec) -> Result<(), CoordinatorError> {
        self.start(spec, None).await
    }

    /// Distribute a job and wait for its final summary.
    pub async fn run_job(&self, spec: JobSpec) -> Result<JobSummary, CoordinatorError> {
        let (done, done_rx) = oneshot::channel();
        self.start(spec, Some(done)).await?;
        done_rx.await.map_err(|_| CoordinatorError::Stopped)
    }

    /// Fail a distributed job now. Returns false if the job is not tracked.
    pub async fn abandon(&self, job_id: &str, reason: &str) -> Result<bool, CoordinatorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Command::Abandon {
            job_id: job_id.to_string(),
            reason: reason.to_string(),
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| CoordinatorError::Stopped)
    }

    /// Snapshot of workers and assignments.
    pub async fn stats(&self) -> Result<ClusterStats, CoordinatorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Command::Stats { reply }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::Stopped)
    }

    /// Subscribe to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Stop the coordinator task. Jobs still tracked never finish.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping sync coordinator");
            let _ = self.shutdown_tx.send(());
        }
    }

    async fn start(
        &self,
        spec: JobSpec,
        done: Option<oneshot::Sender<JobSummary>>,
    ) -> Result<(), CoordinatorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Command::StartJob { spec, done, reply }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::Stopped)?
    }

    async fn send(&self, command: Command) -> Result<(), CoordinatorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoordinatorError::Stopped)
    }
}

struct CoordinatorTask {
    config: CoordinatorConfig,
    state: CoordinatorState,
    inboxes: HashMap<WorkerId, mpsc::Sender<BatchAssignment>>,
    waiters: HashMap<String, oneshot::Sender<JobSummary>>,
    job_store: Arc<dyn JobStore>,
    events: broadcast::Sender<SyncEvent>,
}

impl CoordinatorTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut reports: mpsc::Receiver<WorkerReport>,
        mut shutdown_rx: broadcast::Receiver<()>,
        running: Arc<AtomicBool>,
    ) {
        info!(
            stall_timeout_secs = self.config.stall_timeout.as_secs(),
            "Sync coordinator started"
        );
        let mut stall_check = tokio::time::interval(self.config.check_interval);
        stall_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Sync coordinator received shutdown signal");
                    break;
                }
                Some(command) = commands.recv() => self.handle_command(command),
                Some(report) = reports.recv() => self.handle_report(report),
                _ = stall_check.tick() => self.check_stalled(),
            }
        }

        running.store(false, Ordering::SeqCst);
        info!("Sync coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddWorker {
                worker_id,
                inbox,
                reply,
            } => {
                self.inboxes.insert(worker_id, inbox);
                let _ = reply.send(());
            }
            Command::WorkerLost { worker_id } => self.lose_worker(worker_id),
            Command::StartJob { spec, done, reply } => {
                let job_id = spec.job_id.clone();
                let files = spec.files.len();
                match self.state.start_job(spec, Instant::now()) {
                    Ok(dispatch) => {
                        info!(
                            job_id = %job_id,
                            files,
                            assigned = dispatch.len(),
                            "Distributing sync job"
                        );
                        if let Some(done) = done {
                            self.waiters.insert(job_id, done);
                        }
                        let _ = reply.send(Ok(()));
                        self.dispatch(dispatch);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Abandon {
                job_id,
                reason,
                reply,
            } => {
                let summary = self.state.abandon(&job_id, &reason);
                let found = summary.is_some();
                if let Some(summary) = summary {
                    warn!(job_id = %job_id, reason = %reason, "Sync job abandoned");
                    self.finish(summary);
                }
                let _ = reply.send(found);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.state.stats());
            }
        }
    }

    fn handle_report(&mut self, report: WorkerReport) {
        let worker_id = report.worker_id;
        match report.message {
            WorkerMessage::Ready => {
                if !self.inboxes.contains_key(&worker_id) {
                    warn!(worker_id, "Ready from unregistered worker ignored");
                    return;
                }
                debug!(worker_id, "Worker available");
                let dispatch = self.state.add_worker(worker_id);
                self.dispatch(dispatch);
            }
            WorkerMessage::Progress(update) => {
                self.state.touch(
                    worker_id,
                    &update.job_id,
                    update.batch_index,
                    Instant::now(),
                );
                let _ = self.events.send(SyncEvent::Progress {
                    job_id: update.job_id,
                    batch_index: update.batch_index,
                    current_file: update.current_file,
                    fraction_complete: update.fraction_complete,
                });
            }
            WorkerMessage::BatchCompleted {
                job_id,
                batch_index,
                results,
            } => {
                let outcome = self.state.batch_completed(
                    worker_id,
                    &job_id,
                    batch_index,
                    &results,
                    Instant::now(),
                );
                if !outcome.accepted {
                    debug!(worker_id, job_id = %job_id, batch_index, "Stale batch report ignored");
                    self.dispatch(outcome.dispatch);
                    return;
                }

                metrics::BATCHES_RESOLVED
                    .with_label_values(&["completed"])
                    .inc();
                for result in &results {
                    let entry = match &result.outcome {
                        TransferOutcome::Success { destination_url } => {
                            SyncLogEntry::new(&job_id, LogLevel::Success, destination_url)
                        }
                        TransferOutcome::Failed { .. } => SyncLogEntry::new(
                            &job_id,
                            LogLevel::Error,
                            result.tagged_error().unwrap_or_default(),
                        ),
                    };
                    self.append_log(entry.for_file(&result.file));
                }

                if let Some(counters) = &outcome.counters {
                    let synced = counters.synced_files;
                    let failed = counters.failed_files;
                    info!(
                        job_id = %job_id,
                        batch_index,
                        worker_id,
                        synced,
                        failed,
                        done = counters.completed_batches + counters.failed_batches,
                        total = counters.total_batches,
                        "Batch completed"
                    );
                    let (batch_synced, batch_failed) = crate::job::tally(&results);
                    let _ = self.events.send(SyncEvent::BatchCompleted {
                        job_id: job_id.clone(),
                        batch_index,
                        synced: batch_synced,
                        failed: batch_failed,
                    });
                    if outcome.finished.is_none() {
                        self.update_counters(&job_id, synced, failed);
                    }
                }

                if let Some(summary) = outcome.finished {
                    self.finish(summary);
                }
                self.dispatch(outcome.dispatch);
            }
            WorkerMessage::BatchFailed {
                job_id,
                batch_index,
                error,
            } => {
                let outcome = self.state.batch_failed(
                    worker_id,
                    &job_id,
                    batch_index,
                    &error,
                    Instant::now(),
                );
                if !outcome.accepted {
                    debug!(worker_id, job_id = %job_id, batch_index, "Stale batch failure ignored");
                    self.dispatch(outcome.dispatch);
                    return;
                }

                metrics::BATCHES_RESOLVED
                    .with_label_values(&["failed"])
                    .inc();
                warn!(job_id = %job_id, batch_index, worker_id, error = %error, "Batch failed");
                let message = format!("Batch {} failed: {}", batch_index, error);
                self.append_log(SyncLogEntry::new(&job_id, LogLevel::Error, &message));
                let _ = self.events.send(SyncEvent::Error {
                    job_id: job_id.clone(),
                    batch_index: Some(batch_index),
                    message,
                });

                if let (Some(counters), None) = (&outcome.counters, &outcome.finished) {
                    self.update_counters(&job_id, counters.synced_files, counters.failed_files);
                }
                if let Some(summary) = outcome.finished {
                    self.finish(summary);
                }
                self.dispatch(outcome.dispatch);
            }
        }
    }

    fn lose_worker(&mut self, worker_id: WorkerId) {
        self.inboxes.remove(&worker_id);
        if self.state.worker_slot(worker_id).is_none() {
            return;
        }

        let loss = self.state.remove_worker(worker_id);
        metrics::WORKERS_LOST.inc();
        match &loss.orphaned {
            Some((job_id, batch_index)) => {
                warn!(
                    worker_id,
                    job_id = %job_id,
                    batch_index,
                    reassigned = loss.reassigned,
                    "Sync worker lost with batch in flight"
                );
                if loss.reassigned {
                    metrics::BATCHES_REASSIGNED.inc();
                }
            }
            None => warn!(worker_id, "Idle sync worker lost"),
        }
        self.dispatch(loss.dispatch);
    }

    /// Deliver assignments. A closed inbox counts as a lost worker, whose
    /// batch is then rescheduled.
    fn dispatch(&mut self, dispatch: Vec<Dispatch>) {
        let mut queue: VecDeque<Dispatch> = dispatch.into();
        while let Some(Dispatch {
            worker_id,
            assignment,
        }) = queue.pop_front()
        {
            let job_id = assignment.job_id.clone();
            let batch_index = assignment.batch_index;
            let delivered = self
                .inboxes
                .get(&worker_id)
                .is_some_and(|inbox| inbox.try_send(assignment).is_ok());

            if delivered {
                debug!(worker_id, job_id = %job_id, batch_index, "Batch assigned");
                continue;
            }

            warn!(worker_id, job_id = %job_id, batch_index, "Worker unreachable, rescheduling batch");
            self.inboxes.remove(&worker_id);
            let loss = self.state.remove_worker(worker_id);
            metrics::WORKERS_LOST.inc();
            if loss.reassigned {
                metrics::BATCHES_REASSIGNED.inc();
            }
            queue.extend(loss.dispatch);
        }
    }

    fn check_stalled(&mut self) {
        let timeout = self.config.stall_timeout;
        for job_id in self.state.stalled_jobs(Instant::now(), timeout) {
            let reason = format!(
                "Job stalled: no sync worker available for {}s",
                timeout.as_secs()
            );
            if let Some(summary) = self.state.abandon(&job_id, &reason) {
                error!(job_id = %job_id, "Sync job stalled, marking failed");
                self.finish(summary);
            }
        }
    }

    /// Record the terminal status and notify listeners. Called once per job.
    fn finish(&mut self, summary: JobSummary) {
        let job_id = summary.counters.job_id.clone();
        let mut update = JobStatusUpdate::new(summary.status)
            .with_counts(summary.counters.synced_files, summary.counters.failed_files);
        if let Some(message) = &summary.error_message {
            update = update.with_error(message.clone());
        }
        if let Err(e) = self.job_store.update_job_status(&job_id, update) {
            error!(job_id = %job_id, error = %e, "Failed to record final job status");
        }

        let (level, message) = match summary.status {
            JobStatus::Failed => (
                LogLevel::Error,
                format!(
                    "Sync failed: {}",
                    summary.error_message.as_deref().unwrap_or("unknown error")
                ),
            ),
            _ => (
                LogLevel::Info,
                format!(
                    "Sync finished: {} synced, {} failed",
                    summary.counters.synced_files, summary.counters.failed_files
                ),
            ),
        };
        self.append_log(SyncLogEntry::new(&job_id, level, message));

        metrics::JOBS_FINISHED
            .with_label_values(&[summary.status.as_str(), "distributed"])
            .inc();
        info!(
            job_id = %job_id,
            status = %summary.status,
            synced = summary.counters.synced_files,
            failed = summary.counters.failed_files,
            "Distributed sync finished"
        );

        let _ = self.events.send(SyncEvent::Completed(summary.clone()));
        if let Some(waiter) = self.waiters.remove(&job_id) {
            let _ = waiter.send(summary);
        }
    }

    fn update_counters(&self, job_id: &str, synced: u64, failed: u64) {
        let update = JobStatusUpdate::new(JobStatus::Running).with_counts(synced, failed);
        if let Err(e) = self.job_store.update_job_status(job_id, update) {
            warn!(job_id = %job_id, error = %e, "Failed to update job counters");
        }
    }

    fn append_log(&self, entry: SyncLogEntry) {
        if let Err(e) = self.job_store.append_sync_log(entry) {
            warn!(error = %e, "Failed to append sync log");
        }
    }
}
