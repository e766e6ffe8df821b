//! In-process pool of sync workers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

use crate::worker::{run_worker, BatchProcessor, WorkerId};

use super::runner::SyncCoordinator;
use super::types::CoordinatorError;

/// Worker tasks registered with one coordinator.
///
/// Each worker has a watcher task that reports it lost to the coordinator
/// when it exits, whether it finished, panicked, or was killed.
#[derive(Clone)]
pub struct WorkerPool {
    coordinator: SyncCoordinator,
    processor: Arc<BatchProcessor>,
    workers: Arc<RwLock<BTreeMap<WorkerId, AbortHandle>>>,
}

impl WorkerPool {
    /// Spawn `count` workers.
    pub async fn spawn(
        coordinator: &SyncCoordinator,
        processor: Arc<BatchProcessor>,
        count: usize,
    ) -> Result<Self, CoordinatorError> {
        let pool = Self {
            coordinator: coordinator.clone(),
            processor,
            workers: Arc::new(RwLock::new(BTreeMap::new())),
        };
        for _ in 0..count {
            pool.add_worker().await?;
        }
        info!(workers = count, "Sync worker pool started");
        Ok(pool)
    }

    /// Start one more worker.
    pub async fn add_worker(&self) -> Result<WorkerId, CoordinatorError> {
        let (worker_id, inbox) = self.coordinator.register_worker().await?;
        let handle = tokio::spawn(run_worker(
            worker_id,
            inbox,
            Arc::clone(&self.processor),
            self.coordinator.reporter(),
        ));
        self.workers
            .write()
            .await
            .insert(worker_id, handle.abort_handle());

        let coordinator = self.coordinator.clone();
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            match handle.await {
                Ok(()) => info!(worker_id, "Sync worker exited"),
                Err(e) if e.is_cancelled() => warn!(worker_id, "Sync worker killed"),
                Err(e) => error!(worker_id, error = %e, "Sync worker crashed"),
            }
            workers.write().await.remove(&worker_id);
            coordinator.worker_lost(worker_id).await;
        });

        Ok(worker_id)
    }

    /// Abort a worker mid-batch. Returns false if it is not running.
    pub async fn kill(&self, worker_id: WorkerId) -> bool {
        match self.workers.read().await.get(&worker_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Ids of workers still in the pool.
    pub async fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.read().await.keys().copied().collect()
    }

    /// Abort every worker.
    pub async fn shutdown(&self) {
        let workers = self.workers.read().await;
        info!(workers = workers.len(), "Stopping sync worker pool");
        for handle in workers.values() {
            handle.abort();
        }
    }
}
