//! Mock source fetcher for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::job::FileDescriptor;
use crate::transfer::{SourceFetcher, TransferError};

/// A recorded fetch call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    /// URL that was requested.
    pub url: String,
    /// When the call started (tokio clock, so paused-time tests can diff it).
    pub at: Instant,
}

/// Mock implementation of the SourceFetcher trait.
///
/// Provides controllable behavior for testing:
/// - Serve fixed bodies per URL (unknown URLs answer HTTP 404)
/// - Script a queue of errors per URL, consumed before the body is served
/// - Delay every call to exercise download timeouts
/// - Record every call with its start time
///
/// # Example
///
/// ```rust,ignore
/// use skymover_core::testing::MockFetcher;
///
/// let fetcher = MockFetcher::new();
/// fetcher.set_body("https://src/a.jpg", "bytes").await;
/// fetcher.push_error("https://src/a.jpg", TransferError::from_status(503, "busy")).await;
///
/// // first call fails with 503, second returns "bytes"
/// assert_eq!(fetcher.call_count("https://src/a.jpg").await, 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    /// Bodies served per URL.
    bodies: Arc<RwLock<HashMap<String, Bytes>>>,
    /// Errors returned before the body, per URL.
    scripted: Arc<RwLock<HashMap<String, VecDeque<TransferError>>>>,
    /// Recorded calls.
    calls: Arc<RwLock<Vec<RecordedFetch>>>,
    /// Simulated latency per call.
    delay: Arc<RwLock<Duration>>,
}

impl MockFetcher {
    /// Create a new mock fetcher that knows no URLs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub async fn set_body(&self, url: &str, body: impl Into<Bytes>) {
        self.bodies
            .write()
            .await
            .insert(url.to_string(), body.into());
    }

    /// Serve a small body for every file's source URL.
    pub async fn serve_files(&self, files: &[FileDescriptor]) {
        let mut bodies = self.bodies.write().await;
        for file in files {
            bodies.insert(
                file.source_url.clone(),
                Bytes::from(format!("content of {}", file.public_id)),
            );
        }
    }

    /// Queue an error for the next call to `url`.
    pub async fn push_error(&self, url: &str, error: TransferError) {
        self.scripted
            .write()
            .await
            .entry(url.to_string())
            .or_default()
            .push_back(error);
    }

    /// Set the simulated latency of every call.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedFetch> {
        self.calls.read().await.clone()
    }

    /// Number of calls made for `url`.
    pub async fn call_count(&self, url: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.url == url)
            .count()
    }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, TransferError> {
        self.calls.write().await.push(RecordedFetch {
            url: url.to_string(),
            at: Instant::now(),
        });

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self
            .scripted
            .write()
            .await
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }

        self.bodies
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| TransferError::from_status(404, "Not Found"))
    }
}
