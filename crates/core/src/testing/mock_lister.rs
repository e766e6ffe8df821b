//! Mock source lister for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::credentials::SourceConfig;
use crate::job::{DateRange, FileDescriptor};
use crate::source::{FilePage, ListerError, SourceConnector, SourceLister};

use super::fixtures;

/// Mock implementation of the SourceLister and SourceConnector traits.
///
/// Pages are served in order; page `n` hands out cursor `cursor-{n+1}`
/// unless it is the last one.
#[derive(Debug, Clone, Default)]
pub struct MockLister {
    /// Pages to serve.
    pages: Arc<RwLock<Vec<Vec<FileDescriptor>>>>,
    /// When set, every page returns this cursor.
    stuck_cursor: Arc<RwLock<Option<String>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<ListerError>>>,
    /// Cursor of every call.
    calls: Arc<RwLock<Vec<Option<String>>>>,
}

impl MockLister {
    /// Create a lister that returns an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve these pages.
    pub async fn set_pages(&self, pages: Vec<Vec<FileDescriptor>>) {
        *self.pages.write().await = pages;
    }

    /// Serve all files as a single page.
    pub async fn set_files(&self, files: Vec<FileDescriptor>) {
        self.set_pages(vec![files]).await;
    }

    /// Return the same non-empty cursor forever.
    pub async fn set_stuck_cursor(&self, cursor: &str) {
        *self.stuck_cursor.write().await = Some(cursor.to_string());
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ListerError) {
        *self.next_error.write().await = Some(error);
    }

    /// Cursors of every call, in order.
    pub async fn calls(&self) -> Vec<Option<String>> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl SourceLister for MockLister {
    async fn list_page(
        &self,
        _range: &DateRange,
        cursor: Option<&str>,
    ) -> Result<FilePage, ListerError> {
        self.calls.write().await.push(cursor.map(str::to_string));

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        if let Some(stuck) = self.stuck_cursor.read().await.clone() {
            return Ok(FilePage {
                files: vec![fixtures::file_descriptor("stuck")],
                next_cursor: Some(stuck),
            });
        }

        let index = cursor
            .and_then(|c| c.strip_prefix("cursor-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let pages = self.pages.read().await;
        let files = pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < pages.len()).then(|| format!("cursor-{}", index + 1));

        Ok(FilePage { files, next_cursor })
    }
}

impl SourceConnector for MockLister {
    fn connect(&self, _config: &SourceConfig) -> Result<Arc<dyn SourceLister>, ListerError> {
        Ok(Arc::new(self.clone()))
    }
}
