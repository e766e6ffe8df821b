//! Download-then-upload pipeline for a single file.

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::destination::{sanitize_file_name, DestinationStore, UPLOAD_TIMEOUT};
use crate::job::{FileDescriptor, TransferResult};
use crate::metrics;

use super::fetcher::SourceFetcher;
use super::types::{
    RetryPolicy, TransferError, TransferFailure, TransferOptions, TransferStep, TransferSuccess,
};

/// Moves one file from a source URL into a destination store.
///
/// Holds no per-file state, so one pipeline can serve many files concurrently.
#[derive(Clone)]
pub struct TransferPipeline {
    fetcher: Arc<dyn SourceFetcher>,
    destination: Arc<dyn DestinationStore>,
}

impl TransferPipeline {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, destination: Arc<dyn DestinationStore>) -> Self {
        Self {
            fetcher,
            destination,
        }
    }

    /// Download `source_url` and store it as `destination_name`.
    pub async fn transfer(
        &self,
        source_url: &str,
        destination_name: &str,
        options: &TransferOptions,
    ) -> Result<TransferSuccess, TransferFailure> {
        let timeout = options.download_timeout();
        let fetcher = &self.fetcher;

        let (body, download_attempts) = with_retries(
            TransferStep::Download,
            &options.download_policy(),
            |_| async move {
                match tokio::time::timeout(timeout, fetcher.fetch(source_url)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransferError::Timeout(format!(
                        "download exceeded {}ms",
                        timeout.as_millis()
                    ))),
                }
            },
        )
        .await?;

        let bytes = body.len() as u64;
        debug!(
            url = source_url,
            bytes,
            attempts = download_attempts,
            "Downloaded source file"
        );

        let destination = &self.destination;
        let (stored_url, upload_attempts) =
            with_retries(TransferStep::Upload, &options.upload_policy(), |_| {
                let body: Bytes = body.clone();
                async move {
                    match tokio::time::timeout(
                        UPLOAD_TIMEOUT,
                        destination.put(destination_name, body),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(TransferError::Timeout(format!(
                            "upload exceeded {}ms",
                            UPLOAD_TIMEOUT.as_millis()
                        ))),
                    }
                }
            })
            .await?;

        metrics::BYTES_UPLOADED.inc_by(bytes);

        Ok(TransferSuccess {
            destination_url: self
                .destination
                .public_url(destination_name)
                .unwrap_or(stored_url),
            bytes,
            download_attempts,
            upload_attempts,
        })
    }

    /// Transfer a listed file and fold the outcome into a [`TransferResult`].
    pub async fn transfer_file(
        &self,
        file: &FileDescriptor,
        options: &TransferOptions,
    ) -> TransferResult {
        let name = sanitize_file_name(&file.public_id, &file.format);
        let started = Instant::now();

        let result = match self.transfer(&file.source_url, &name, options).await {
            Ok(success) => {
                metrics::FILES_TRANSFERRED
                    .with_label_values(&["success"])
                    .inc();
                TransferResult::success(&file.public_id, success.destination_url)
            }
            Err(failure) => {
                warn!(
                    file = %file.public_id,
                    step = %failure.step,
                    category = failure.category.label(),
                    attempts = failure.attempts,
                    error = %failure.error,
                    "File transfer failed"
                );
                metrics::FILES_TRANSFERRED
                    .with_label_values(&[failure.category.as_str()])
                    .inc();
                TransferResult::failure(&file.public_id, failure.category, failure.message())
            }
        };

        let label = if result.is_success() {
            "success"
        } else {
            "failed"
        };
        metrics::TRANSFER_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        result
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the policy's
/// attempts run out. Returns the value and the number of attempts used.
async fn with_retries<T, F, Fut>(
    step: TransferStep,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<(T, u32), TransferFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let step_label = match step {
        TransferStep::Download => "download",
        TransferStep::Upload => "upload",
    };
    let mut attempt = 1;
    loop {
        metrics::TRANSFER_ATTEMPTS
            .with_label_values(&[step_label])
            .inc();

        let error = match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) => e,
        };

        if !error.is_retryable() || attempt >= policy.max_attempts {
            return Err(TransferFailure {
                step,
                category: error.category(),
                error,
                attempts: attempt,
            });
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            step = step_label,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transfer step failed, retrying"
        );
        metrics::TRANSFER_RETRIES
            .with_label_values(&[step_label])
            .inc();
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
