//! Types for the transfer pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::job::FailureCategory;

/// Error from one attempt of a transfer step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// The attempt exceeded its time bound.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Connection reset, DNS failure and similar transport errors.
    #[error("network error: {0}")]
    Network(String),

    /// The remote answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl TransferError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        TransferError::Http {
            status,
            message: message.into(),
        }
    }

    /// Category recorded when this error ends a step.
    pub fn category(&self) -> FailureCategory {
        match self {
            TransferError::Timeout(_) => FailureCategory::Timeout,
            TransferError::Network(_) => FailureCategory::Network,
            TransferError::Http { status, .. } if (400..500).contains(status) => {
                FailureCategory::ClientError
            }
            TransferError::Http { status, .. } if (500..600).contains(status) => {
                FailureCategory::ServerError
            }
            TransferError::Http { .. } | TransferError::Other(_) => FailureCategory::Unknown,
        }
    }

    /// Client errors other than 429 end the step immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Http { status, .. } => *status == 429 || !(400..500).contains(status),
            _ => true,
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransferError::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            TransferError::from_status(status.as_u16(), e.to_string())
        } else if e.is_connect() || e.is_request() || e.is_body() || e.is_decode() {
            TransferError::Network(e.to_string())
        } else {
            TransferError::Other(e.to_string())
        }
    }
}

/// Bounded exponential backoff for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Download policy: 1s base, 10s cap.
    pub fn download(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }

    /// Upload policy: 2s base, 15s cap.
    pub fn upload(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 2000,
            max_delay_ms: 15_000,
        }
    }

    /// Delay after failed attempt `attempt` (1-indexed): `min(base * 2^(attempt-1), cap)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Options shared by every file of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    pub download_retries: u32,
    pub upload_retries: u32,
    pub download_timeout_ms: u64,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            download_retries: 3,
            upload_retries: 3,
            download_timeout_ms: 45_000,
        }
    }
}

impl TransferOptions {
    /// Build options, clamping each value into its accepted range.
    pub fn clamped(download_retries: u32, upload_retries: u32, download_timeout_secs: u64) -> Self {
        Self {
            download_retries: download_retries.clamp(1, 5),
            upload_retries: upload_retries.clamp(1, 5),
            download_timeout_ms: download_timeout_secs.clamp(10, 120) * 1000,
        }
    }

    pub fn download_policy(&self) -> RetryPolicy {
        RetryPolicy::download(self.download_retries)
    }

    pub fn upload_policy(&self) -> RetryPolicy {
        RetryPolicy::upload(self.upload_retries)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

/// Which half of a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStep {
    Download,
    Upload,
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStep::Download => f.write_str("Download"),
            TransferStep::Upload => f.write_str("Upload"),
        }
    }
}

/// A transfer that exhausted (or could not use) its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub step: TransferStep,
    pub category: FailureCategory,
    pub error: TransferError,
    pub attempts: u32,
}

impl TransferFailure {
    pub fn message(&self) -> String {
        format!(
            "{} failed after {} attempt{}: {}",
            self.step,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.error
        )
    }
}

/// A completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSuccess {
    pub destination_url: String,
    pub bytes: u64,
    pub download_attempts: u32,
    pub upload_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_backoff_sequence() {
        let policy = RetryPolicy::download(5);
        let delays: Vec<_> = (1..=6)
            .map(|n| policy.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_upload_backoff_sequence() {
        let policy = RetryPolicy::upload(5);
        let delays: Vec<_> = (1..=5)
            .map(|n| policy.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 15_000, 15_000]);
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let policy = RetryPolicy::upload(5);
        assert_eq!(policy.delay_for_attempt(200), Duration::from_millis(15_000));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            TransferError::from_status(404, "missing").category(),
            FailureCategory::ClientError
        );
        assert!(!TransferError::from_status(404, "missing").is_retryable());

        let rate_limited = TransferError::from_status(429, "slow down");
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.category(), FailureCategory::ClientError);

        let server = TransferError::from_status(503, "unavailable");
        assert!(server.is_retryable());
        assert_eq!(server.category(), FailureCategory::ServerError);

        assert_eq!(
            TransferError::Timeout("45s".into()).category(),
            FailureCategory::Timeout
        );
        assert_eq!(
            TransferError::Network("reset".into()).category(),
            FailureCategory::Network
        );
        assert_eq!(
            TransferError::Other("?".into()).category(),
            FailureCategory::Unknown
        );
    }

    #[test]
    fn test_options_clamped() {
        let options = TransferOptions::clamped(0, 9, 500);
        assert_eq!(options.download_retries, 1);
        assert_eq!(options.upload_retries, 5);
        assert_eq!(options.download_timeout_ms, 120_000);

        let options = TransferOptions::clamped(3, 3, 1);
        assert_eq!(options.download_timeout_ms, 10_000);
    }

    #[test]
    fn test_failure_message() {
        let failure = TransferFailure {
            step: TransferStep::Download,
            category: FailureCategory::ClientError,
            error: TransferError::from_status(404, "Not Found"),
            attempts: 1,
        };
        assert_eq!(
            failure.message(),
            "Download failed after 1 attempt: HTTP 404: Not Found"
        );
    }
}
