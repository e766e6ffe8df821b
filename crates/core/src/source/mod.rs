//! Source providers: paginated listing of files in a date range.

mod cloudinary;

pub use cloudinary::{search_expression, CloudinaryConnector, CloudinaryLister, PAGE_SIZE};

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::credentials::SourceConfig;
use crate::job::{DateRange, FileDescriptor};
use crate::metrics;

/// Errors from source listing.
#[derive(Debug, Error)]
pub enum ListerError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("listing exceeded {0} pages")]
    TooManyPages(usize),

    #[error("listing returned cursor {0:?} twice")]
    RepeatedCursor(String),

    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),
}

/// One page of listed files.
#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub files: Vec<FileDescriptor>,
    pub next_cursor: Option<String>,
}

/// Cursor-paginated listing of source files.
#[async_trait]
pub trait SourceLister: Send + Sync {
    /// Fetch the page at `cursor` (`None` for the first page).
    async fn list_page(
        &self,
        range: &DateRange,
        cursor: Option<&str>,
    ) -> Result<FilePage, ListerError>;
}

/// Creates a [`SourceLister`] from account credentials.
pub trait SourceConnector: Send + Sync {
    fn connect(&self, config: &SourceConfig) -> Result<Arc<dyn SourceLister>, ListerError>;
}

/// Bounds on a full listing.
#[derive(Debug, Clone, Copy)]
pub struct ListingLimits {
    pub max_pages: usize,
    pub page_delay: Duration,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self {
            max_pages: 1000,
            page_delay: Duration::from_millis(200),
        }
    }
}

/// Follow cursors until the lister returns none.
///
/// Fails if the page limit is hit or a cursor comes back a second time.
pub async fn list_files_in_range(
    lister: &dyn SourceLister,
    range: &DateRange,
    limits: &ListingLimits,
) -> Result<Vec<FileDescriptor>, ListerError> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;

    loop {
        if pages >= limits.max_pages {
            return Err(ListerError::TooManyPages(limits.max_pages));
        }

        let page = lister.list_page(range, cursor.as_deref()).await?;
        pages += 1;
        metrics::LIST_PAGES.inc();
        debug!(
            page = pages,
            returned = page.files.len(),
            next_cursor = ?page.next_cursor,
            "Listed source page"
        );
        files.extend(page.files);

        match page.next_cursor.filter(|c| !c.is_empty()) {
            Some(next) => {
                if !seen.insert(next.clone()) {
                    return Err(ListerError::RepeatedCursor(next));
                }
                cursor = Some(next);
                tokio::time::sleep(limits.page_delay).await;
            }
            None => break,
        }
    }

    info!(
        files = files.len(),
        pages,
        start = %range.start,
        end = %range.end,
        "Source listing complete"
    );
    Ok(files)
}
