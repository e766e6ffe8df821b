//! Worker task loop.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{BatchAssignment, WorkerId, WorkerMessage, WorkerReport};
use super::processor::BatchProcessor;

/// Run one worker until its inbox closes or the coordinator goes away.
///
/// Announces itself with `Ready`, then answers every assignment with exactly
/// one `BatchCompleted` or `BatchFailed`.
pub async fn run_worker(
    id: WorkerId,
    mut inbox: mpsc::Receiver<BatchAssignment>,
    processor: Arc<BatchProcessor>,
    reports: mpsc::Sender<WorkerReport>,
) {
    if reports
        .send(WorkerReport::new(id, WorkerMessage::Ready))
        .await
        .is_err()
    {
        return;
    }
    info!(worker_id = id, "Sync worker ready");

    while let Some(assignment) = inbox.recv().await {
        debug!(
            worker_id = id,
            job_id = %assignment.job_id,
            batch_index = assignment.batch_index,
            files = assignment.files.len(),
            "Processing batch"
        );

        let progress_tx = reports.clone();
        let outcome = processor
            .process_batch(&assignment, |update| {
                // best effort, progress is observability only
                let _ =
                    progress_tx.try_send(WorkerReport::new(id, WorkerMessage::Progress(update)));
            })
            .await;

        let message = match outcome {
            Ok(results) => WorkerMessage::BatchCompleted {
                job_id: assignment.job_id,
                batch_index: assignment.batch_index,
                results,
            },
            Err(e) => {
                warn!(
                    worker_id = id,
                    job_id = %assignment.job_id,
                    batch_index = assignment.batch_index,
                    error = %e,
                    "Batch setup failed"
                );
                WorkerMessage::BatchFailed {
                    job_id: assignment.job_id,
                    batch_index: assignment.batch_index,
                    error: e.to_string(),
                }
            }
        };

        if reports.send(WorkerReport::new(id, message)).await.is_err() {
            break;
        }
    }

    info!(worker_id = id, "Sync worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockDestination, MockFetcher};
    use crate::transfer::TransferOptions;

    #[tokio::test]
    async fn test_worker_reports_ready_then_results() {
        let fetcher = MockFetcher::new();
        let files = fixtures::file_descriptors(2);
        fetcher.serve_files(&files).await;
        let processor = Arc::new(BatchProcessor::new(
            Arc::new(fixtures::credentials()),
            Arc::new(fetcher),
            Arc::new(MockDestination::new()),
        ));

        let (assign_tx, assign_rx) = mpsc::channel(1);
        let (report_tx, mut report_rx) = mpsc::channel(16);
        let handle = tokio::spawn(run_worker(7, assign_rx, processor, report_tx));

        let ready = report_rx.recv().await.unwrap();
        assert_eq!(ready, WorkerReport::new(7, WorkerMessage::Ready));

        assign_tx
            .send(BatchAssignment {
                job_id: "job-1".to_string(),
                batch_index: 0,
                account_id: fixtures::ACCOUNT_ID.to_string(),
                files,
                options: TransferOptions::default(),
            })
            .await
            .unwrap();

        let mut progress = 0;
        loop {
            let report = report_rx.recv().await.unwrap();
            assert_eq!(report.worker_id, 7);
            match report.message {
                WorkerMessage::Progress(_) => progress += 1,
                WorkerMessage::BatchCompleted {
                    batch_index,
                    results,
                    ..
                } => {
                    assert_eq!(batch_index, 0);
                    assert_eq!(results.len(), 2);
                    break;
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
        assert_eq!(progress, 2);

        drop(assign_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_reports_batch_failed() {
        let credentials = fixtures::credentials();
        credentials.remove_destination(fixtures::ACCOUNT_ID);
        let processor = Arc::new(BatchProcessor::new(
            Arc::new(credentials),
            Arc::new(MockFetcher::new()),
            Arc::new(MockDestination::new()),
        ));

        let (assign_tx, assign_rx) = mpsc::channel(1);
        let (report_tx, mut report_rx) = mpsc::channel(16);
        tokio::spawn(run_worker(1, assign_rx, processor, report_tx));
        report_rx.recv().await.unwrap();

        assign_tx
            .send(BatchAssignment {
                job_id: "job-1".to_string(),
                batch_index: 3,
                account_id: fixtures::ACCOUNT_ID.to_string(),
                files: fixtures::file_descriptors(1),
                options: TransferOptions::default(),
            })
            .await
            .unwrap();

        match report_rx.recv().await.unwrap().message {
            WorkerMessage::BatchFailed {
                batch_index, error, ..
            } => {
                assert_eq!(batch_index, 3);
                assert!(error.contains("destination credentials not configured"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
