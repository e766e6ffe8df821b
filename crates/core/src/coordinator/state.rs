//! Scheduling state of the coordinator.
//!
//! Pure bookkeeping: no channels, no I/O. Every mutation returns the
//! assignments that must be dispatched and, when a job resolves its last
//! batch, the job's summary. Only the coordinator task owns this state.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::job::{create_batches, tally, Batch, FileDescriptor, JobStatus, TransferResult};
use crate::transfer::TransferOptions;
use crate::worker::{BatchAssignment, WorkerId};

use super::types::{ClusterStats, CoordinatorError, JobCounters, JobSummary, WorkerAssignment};

/// Availability of a registered worker. Lost workers are removed outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkerSlot {
    Idle,
    Assigned { job_id: String, batch_index: usize },
}

/// A job handed to the coordinator.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: String,
    pub account_id: String,
    pub files: Vec<FileDescriptor>,
    pub batch_size: usize,
    pub options: TransferOptions,
    /// Most workers this job may hold at once.
    pub max_workers: usize,
}

/// An assignment to deliver to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub worker_id: WorkerId,
    pub assignment: BatchAssignment,
}

/// Result of applying a worker report.
#[derive(Debug, Default)]
pub struct ReportOutcome {
    /// Whether the report matched a live assignment.
    pub accepted: bool,
    pub dispatch: Vec<Dispatch>,
    /// Counters after the report, if the job is still tracked or just finished.
    pub counters: Option<JobCounters>,
    pub finished: Option<JobSummary>,
}

/// Result of losing a worker.
#[derive(Debug, Default)]
pub struct WorkerLoss {
    /// The batch the worker held, if any.
    pub orphaned: Option<(String, usize)>,
    /// Whether that batch went straight to another worker.
    pub reassigned: bool,
    pub dispatch: Vec<Dispatch>,
}

#[derive(Debug)]
struct InFlight {
    worker_id: WorkerId,
    batch: Batch,
}

#[derive(Debug)]
struct JobTracker {
    account_id: String,
    options: TransferOptions,
    max_workers: usize,
    remaining: VecDeque<Batch>,
    in_flight: BTreeMap<usize, InFlight>,
    total_batches: usize,
    completed_batches: usize,
    failed_batches: usize,
    total_files: u64,
    synced_files: u64,
    failed_files: u64,
    files_attempted: bool,
    last_error: Option<String>,
    last_activity: Instant,
}

impl JobTracker {
    fn counters(&self, job_id: &str) -> JobCounters {
        JobCounters {
            job_id: job_id.to_string(),
            total_files: self.total_files,
            synced_files: self.synced_files,
            failed_files: self.failed_files,
            total_batches: self.total_batches,
            completed_batches: self.completed_batches,
            failed_batches: self.failed_batches,
        }
    }

    fn is_done(&self) -> bool {
        self.completed_batches + self.failed_batches == self.total_batches
    }

    fn has_capacity(&self) -> bool {
        !self.remaining.is_empty() && self.in_flight.len() < self.max_workers
    }

    fn summary(&self, job_id: &str, status: JobStatus, error: Option<String>) -> JobSummary {
        JobSummary {
            counters: self.counters(job_id),
            account_id: self.account_id.clone(),
            status,
            error_message: error,
        }
    }
}

/// Worker pool and per-job batch bookkeeping.
#[derive(Debug, Default)]
pub struct CoordinatorState {
    workers: BTreeMap<WorkerId, WorkerSlot>,
    jobs: HashMap<String, JobTracker>,
    /// Job ids in start order, used to pick which job an idle worker serves.
    job_order: Vec<String>,
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an idle worker and hand it pending work.
    pub fn add_worker(&mut self, worker_id: WorkerId) -> Vec<Dispatch> {
        self.workers.insert(worker_id, WorkerSlot::Idle);
        self.fill(Some(worker_id), None)
    }

    /// Remove a worker. Its in-flight batch keeps its index and goes to an
    /// idle worker, or to the front of the job's queue.
    pub fn remove_worker(&mut self, worker_id: WorkerId) -> WorkerLoss {
        let mut loss = WorkerLoss::default();
        let Some(slot) = self.workers.remove(&worker_id) else {
            return loss;
        };
        let WorkerSlot::Assigned {
            job_id,
            batch_index,
        } = slot
        else {
            return loss;
        };
        loss.orphaned = Some((job_id.clone(), batch_index));

        let Some(tracker) = self.jobs.get_mut(&job_id) else {
            return loss;
        };
        let Some(in_flight) = tracker.in_flight.remove(&batch_index) else {
            return loss;
        };

        let idle = self
            .workers
            .iter()
            .find(|(_, slot)| **slot == WorkerSlot::Idle)
            .map(|(id, _)| *id);
        match idle {
            Some(target) => {
                loss.reassigned = true;
                loss.dispatch
                    .push(self.assign(target, &job_id, in_flight.batch));
            }
            None => tracker.remaining.push_front(in_flight.batch),
        }
        loss.dispatch.extend(self.fill(None, None));
        loss
    }

    /// Register a job and assign its first batches to idle workers.
    pub fn start_job(
        &mut self,
        spec: JobSpec,
        now: Instant,
    ) -> Result<Vec<Dispatch>, CoordinatorError> {
        if self.jobs.contains_key(&spec.job_id) {
            return Err(CoordinatorError::DuplicateJob(spec.job_id));
        }
        if spec.files.is_empty() {
            return Err(CoordinatorError::EmptyJob(spec.job_id));
        }

        let total_files = spec.files.len() as u64;
        let batches = create_batches(spec.files, spec.batch_size);
        let tracker = JobTracker {
            account_id: spec.account_id,
            options: spec.options,
            max_workers: spec.max_workers.max(1),
            total_batches: batches.len(),
            remaining: batches.into(),
            in_flight: BTreeMap::new(),
            completed_batches: 0,
            failed_batches: 0,
            total_files,
            synced_files: 0,
            failed_files: 0,
            files_attempted: false,
            last_error: None,
            last_activity: now,
        };
        self.jobs.insert(spec.job_id.clone(), tracker);
        self.job_order.push(spec.job_id.clone());

        Ok(self.fill(None, Some(&spec.job_id)))
    }

    /// Apply a `BatchCompleted` report.
    pub fn batch_completed(
        &mut self,
        worker_id: WorkerId,
        job_id: &str,
        batch_index: usize,
        results: &[TransferResult],
        now: Instant,
    ) -> ReportOutcome {
        let (synced, failed) = tally(results);
        self.resolve(worker_id, job_id, batch_index, now, |tracker, _batch| {
            tracker.completed_batches += 1;
            tracker.synced_files += synced;
            tracker.failed_files += failed;
            tracker.files_attempted = true;
        })
    }

    /// Apply a `BatchFailed` report: every file of the batch counts as failed.
    pub fn batch_failed(
        &mut self,
        worker_id: WorkerId,
        job_id: &str,
        batch_index: usize,
        error: &str,
        now: Instant,
    ) -> ReportOutcome {
        self.resolve(worker_id, job_id, batch_index, now, |tracker, batch| {
            tracker.failed_batches += 1;
            tracker.failed_files += batch.len() as u64;
            tracker.last_error = Some(format!("Batch {} failed: {}", batch_index, error));
        })
    }

    /// Note progress from a worker on its current batch.
    pub fn touch(&mut self, worker_id: WorkerId, job_id: &str, batch_index: usize, now: Instant) {
        if self.holds(worker_id, job_id, batch_index) {
            self.refresh_activity(now);
        }
    }

    /// Drop a job and mark it failed. Workers still on its batches are freed
    /// when they report.
    pub fn abandon(&mut self, job_id: &str, reason: &str) -> Option<JobSummary> {
        let tracker = self.jobs.remove(job_id)?;
        self.job_order.retain(|id| id != job_id);
        Some(tracker.summary(job_id, JobStatus::Failed, Some(reason.to_string())))
    }

    /// Jobs with queued batches and nothing in flight while no worker is
    /// registered, with no activity for `timeout`. A job queued behind busy
    /// workers is waiting, not stalled.
    pub fn stalled_jobs(&self, now: Instant, timeout: Duration) -> Vec<String> {
        if !self.workers.is_empty() {
            return Vec::new();
        }
        self.job_order
            .iter()
            .filter(|id| {
                self.jobs.get(*id).is_some_and(|t| {
                    t.in_flight.is_empty()
                        && !t.remaining.is_empty()
                        && now.saturating_duration_since(t.last_activity) >= timeout
                })
            })
            .cloned()
            .collect()
    }

    pub fn counters(&self, job_id: &str) -> Option<JobCounters> {
        self.jobs.get(job_id).map(|t| t.counters(job_id))
    }

    pub fn worker_slot(&self, worker_id: WorkerId) -> Option<&WorkerSlot> {
        self.workers.get(&worker_id)
    }

    pub fn is_tracking(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn stats(&self) -> ClusterStats {
        ClusterStats {
            total_workers: self.workers.len(),
            available_workers: self
                .workers
                .values()
                .filter(|s| **s == WorkerSlot::Idle)
                .count(),
            active_jobs: self.jobs.len(),
            assignments: self
                .workers
                .iter()
                .filter_map(|(id, slot)| match slot {
                    WorkerSlot::Assigned {
                        job_id,
                        batch_index,
                    } => Some(WorkerAssignment {
                        worker_id: *id,
                        job_id: job_id.clone(),
                        batch_index: *batch_index,
                    }),
                    WorkerSlot::Idle => None,
                })
                .collect(),
        }
    }

    /// Progress anywhere in the pool restarts every job's stall clock.
    fn refresh_activity(&mut self, now: Instant) {
        for tracker in self.jobs.values_mut() {
            tracker.last_activity = now;
        }
    }

    fn holds(&self, worker_id: WorkerId, job_id: &str, batch_index: usize) -> bool {
        matches!(
            self.workers.get(&worker_id),
            Some(WorkerSlot::Assigned { job_id: j, batch_index: b }) if j == job_id && *b == batch_index
        )
    }

    fn resolve<F>(
        &mut self,
        worker_id: WorkerId,
        job_id: &str,
        batch_index: usize,
        now: Instant,
        apply: F,
    ) -> ReportOutcome
    where
        F: FnOnce(&mut JobTracker, &Batch),
    {
        let mut outcome = ReportOutcome::default();

        if !self.holds(worker_id, job_id, batch_index) {
            return outcome;
        }
        self.workers.insert(worker_id, WorkerSlot::Idle);
        self.refresh_activity(now);

        let Some(tracker) = self.jobs.get_mut(job_id) else {
            // released job: nothing to count, just reuse the worker
            outcome.dispatch = self.fill(Some(worker_id), None);
            return outcome;
        };
        let Some(in_flight) = tracker.in_flight.remove(&batch_index) else {
            outcome.dispatch = self.fill(Some(worker_id), None);
            return outcome;
        };

        outcome.accepted = true;
        apply(tracker, &in_flight.batch);
        outcome.counters = Some(tracker.counters(job_id));

        if tracker.is_done() {
            let status = JobStatus::finished(
                tracker.synced_files,
                tracker.failed_files,
                tracker.files_attempted,
            );
            let error = tracker.last_error.clone();
            outcome.finished = Some(tracker.summary(job_id, status, error));
            self.jobs.remove(job_id);
            self.job_order.retain(|id| id != job_id);
        }

        outcome.dispatch = self.fill(Some(worker_id), Some(job_id));
        outcome
    }

    fn assign(&mut self, worker_id: WorkerId, job_id: &str, batch: Batch) -> Dispatch {
        let tracker = self.jobs.get_mut(job_id).map(|t| {
            t.in_flight.insert(
                batch.index,
                InFlight {
                    worker_id,
                    batch: batch.clone(),
                },
            );
            (t.account_id.clone(), t.options)
        });
        let (account_id, options) = tracker.unwrap_or_default();

        self.workers.insert(
            worker_id,
            WorkerSlot::Assigned {
                job_id: job_id.to_string(),
                batch_index: batch.index,
            },
        );

        Dispatch {
            worker_id,
            assignment: BatchAssignment {
                job_id: job_id.to_string(),
                batch_index: batch.index,
                account_id,
                files: batch.files,
                options,
            },
        }
    }

    /// Give queued batches to idle workers, lowest index first.
    ///
    /// `preferred_worker` is offered work before the others. Other jobs with
    /// no batch in flight come first in start order, then `preferred_job`,
    /// then any job with capacity.
    fn fill(
        &mut self,
        preferred_worker: Option<WorkerId>,
        preferred_job: Option<&str>,
    ) -> Vec<Dispatch> {
        let mut idle: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, slot)| **slot == WorkerSlot::Idle)
            .map(|(id, _)| *id)
            .collect();
        if let Some(preferred) = preferred_worker {
            if let Some(pos) = idle.iter().position(|id| *id == preferred) {
                idle.remove(pos);
                idle.insert(0, preferred);
            }
        }

        let mut dispatch = Vec::new();
        for worker_id in idle {
            let job_id = self
                .job_order
                .iter()
                .find(|id| {
                    Some(id.as_str()) != preferred_job
                        && self
                            .jobs
                            .get(*id)
                            .is_some_and(|t| t.in_flight.is_empty() && t.has_capacity())
                })
                .cloned()
                .or_else(|| {
                    preferred_job
                        .filter(|id| self.jobs.get(*id).is_some_and(JobTracker::has_capacity))
                        .map(str::to_string)
                })
                .or_else(|| {
                    self.job_order
                        .iter()
                        .find(|id| self.jobs.get(*id).is_some_and(JobTracker::has_capacity))
                        .cloned()
                });
            let Some(job_id) = job_id else {
                break;
            };
            let Some(batch) = self
                .jobs
                .get_mut(&job_id)
                .and_then(|t| t.remaining.pop_front())
            else {
                break;
            };
            dispatch.push(self.assign(worker_id, &job_id, batch));
        }
        dispatch
    }

    /// Worker currently holding a batch, if any.
    #[cfg(test)]
    fn holder_of(&self, job_id: &str, batch_index: usize) -> Option<WorkerId> {
        self.jobs
            .get(job_id)
            .and_then(|t| t.in_flight.get(&batch_index))
            .map(|f| f.worker_id)
    }
}
