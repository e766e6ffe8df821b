//! Mock destination store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::credentials::DestinationConfig;
use crate::destination::{
    public_url, DestinationConnector, DestinationError, DestinationStore, DEFAULT_ROOT_FOLDER,
};
use crate::transfer::TransferError;

/// A stored object for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    /// Destination file name.
    pub name: String,
    /// Size of the stored body.
    pub bytes: usize,
}

/// Mock implementation of the DestinationStore and DestinationConnector traits.
///
/// Provides controllable behavior for testing:
/// - Record successful uploads and the time of every attempt
/// - Script a queue of errors per file name
/// - Fail a file name on every attempt
/// - Simulate upload latency
///
/// Connecting returns a handle that shares all recorded state with this mock.
#[derive(Debug, Clone)]
pub struct MockDestination {
    folder: String,
    pull_zone: Option<String>,
    /// Successful uploads.
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    /// Every attempt, successful or not.
    attempts: Arc<RwLock<Vec<(String, Instant)>>>,
    /// Errors returned before success, per file name.
    scripted: Arc<RwLock<HashMap<String, VecDeque<TransferError>>>>,
    /// Errors returned on every attempt, per file name.
    always: Arc<RwLock<HashMap<String, TransferError>>>,
    /// Simulated latency per attempt.
    delay: Arc<RwLock<Duration>>,
}

impl Default for MockDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDestination {
    /// Create a new mock destination that accepts every upload.
    pub fn new() -> Self {
        Self {
            folder: DEFAULT_ROOT_FOLDER.to_string(),
            pull_zone: None,
            uploads: Arc::new(RwLock::new(Vec::new())),
            attempts: Arc::new(RwLock::new(Vec::new())),
            scripted: Arc::new(RwLock::new(HashMap::new())),
            always: Arc::new(RwLock::new(HashMap::new())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// Report public URLs under `pull_zone`.
    pub fn with_pull_zone(mut self, pull_zone: impl Into<String>) -> Self {
        self.pull_zone = Some(pull_zone.into());
        self
    }

    /// Queue an error for the next attempt to store `name`.
    pub async fn push_error(&self, name: &str, error: TransferError) {
        self.scripted
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail every attempt to store `name`.
    pub async fn fail_always(&self, name: &str, error: TransferError) {
        self.always.write().await.insert(name.to_string(), error);
    }

    /// Set the simulated latency of every attempt.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Get all successful uploads.
    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    /// Number of successful uploads.
    pub async fn upload_count(&self) -> usize {
        self.uploads.read().await.len()
    }

    /// Number of attempts to store `name`.
    pub async fn upload_attempts(&self, name: &str) -> usize {
        self.attempts
            .read()
            .await
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }

    /// Start times of every attempt to store `name`.
    pub async fn upload_times(&self, name: &str) -> Vec<Instant> {
        self.attempts
            .read()
            .await
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Start times of every attempt, in order.
    pub async fn all_attempt_times(&self) -> Vec<Instant> {
        self.attempts
            .read()
            .await
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl DestinationStore for MockDestination {
    fn name(&self) -> &str {
        "mock"
    }

    async fn put(&self, file_name: &str, body: Bytes) -> Result<String, TransferError> {
        self.attempts
            .write()
            .await
            .push((file_name.to_string(), Instant::now()));

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self
            .scripted
            .write()
            .await
            .get_mut(file_name)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        if let Some(error) = self.always.read().await.get(file_name) {
            return Err(error.clone());
        }

        self.uploads.write().await.push(RecordedUpload {
            name: file_name.to_string(),
            bytes: body.len(),
        });
        Ok(format!("mock://dest/{}/{}", self.folder, file_name))
    }

    fn public_url(&self, file_name: &str) -> Option<String> {
        self.pull_zone
            .as_deref()
            .map(|zone| public_url(zone, &self.folder, file_name))
    }
}

impl DestinationConnector for MockDestination {
    fn connect(
        &self,
        _config: &DestinationConfig,
    ) -> Result<Arc<dyn DestinationStore>, DestinationError> {
        Ok(Arc::new(self.clone()))
    }
}
