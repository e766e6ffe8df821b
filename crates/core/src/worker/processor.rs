//! Batch processing inside a worker.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::credentials::{CredentialError, CredentialStore};
use crate::destination::{DestinationConnector, DestinationError};
use crate::job::{tally, TransferResult};
use crate::transfer::{SourceFetcher, TransferPipeline};

use super::messages::{BatchAssignment, ProgressUpdate};

/// Setup failure before any file of a batch was attempted.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Destination(#[from] DestinationError),
}

/// Runs the transfer pipeline over every file of an assignment.
///
/// Keeps no job state: results go back to the caller, which owns the counters.
pub struct BatchProcessor {
    credentials: Arc<dyn CredentialStore>,
    fetcher: Arc<dyn SourceFetcher>,
    connector: Arc<dyn DestinationConnector>,
}

impl BatchProcessor {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        fetcher: Arc<dyn SourceFetcher>,
        connector: Arc<dyn DestinationConnector>,
    ) -> Self {
        Self {
            credentials,
            fetcher,
            connector,
        }
    }

    /// Process files in order. A failed file never stops its siblings.
    pub async fn process_batch<F>(
        &self,
        assignment: &BatchAssignment,
        mut on_progress: F,
    ) -> Result<Vec<TransferResult>, BatchError>
    where
        F: FnMut(ProgressUpdate),
    {
        let config = self
            .credentials
            .destination_config(&assignment.account_id)?;
        let destination = self.connector.connect(&config)?;
        let pipeline = TransferPipeline::new(Arc::clone(&self.fetcher), destination);

        let total = assignment.files.len();
        let mut results = Vec::with_capacity(total);
        for (i, file) in assignment.files.iter().enumerate() {
            let result = pipeline.transfer_file(file, &assignment.options).await;
            debug!(
                job_id = %assignment.job_id,
                batch_index = assignment.batch_index,
                file = %file.public_id,
                success = result.is_success(),
                "File processed"
            );
            results.push(result);

            on_progress(ProgressUpdate {
                job_id: assignment.job_id.clone(),
                batch_index: assignment.batch_index,
                current_file: file.public_id.clone(),
                fraction_complete: (i + 1) as f64 / total as f64,
            });
        }

        let (synced, failed) = tally(&results);
        info!(
            job_id = %assignment.job_id,
            batch_index = assignment.batch_index,
            synced,
            failed,
            "Batch processed"
        );
        Ok(results)
    }
}
