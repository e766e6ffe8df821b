//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of every external collaborator
//! trait, so sync jobs can be exercised end to end without real providers.
//!
//! # Example
//!
//! ```rust,ignore
//! use skymover_core::testing::{fixtures, MockDestination, MockFetcher, MockLister};
//!
//! let files = fixtures::file_descriptors(25);
//! let lister = MockLister::new();
//! lister.set_files(files.clone()).await;
//!
//! let fetcher = MockFetcher::new();
//! fetcher.serve_files(&files).await;
//!
//! let destination = MockDestination::new();
//! // Use in a SyncService...
//! ```

mod mock_credentials;
mod mock_destination;
mod mock_fetcher;
mod mock_lister;

pub use mock_credentials::MockCredentialStore;
pub use mock_destination::{MockDestination, RecordedUpload};
pub use mock_fetcher::{MockFetcher, RecordedFetch};
pub use mock_lister::MockLister;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::NaiveDate;

    use crate::credentials::{DestinationConfig, SourceConfig};
    use crate::job::{DateRange, FileDescriptor};
    use crate::testing::MockCredentialStore;

    /// Account used by fixtures.
    pub const ACCOUNT_ID: &str = "acct-1";

    /// A listed file with a predictable source URL.
    pub fn file_descriptor(public_id: &str) -> FileDescriptor {
        FileDescriptor {
            public_id: public_id.to_string(),
            source_url: format!("https://res.example.com/{}.jpg", public_id),
            bytes: 1024,
            format: "jpg".to_string(),
        }
    }

    /// `count` files named `file-000`, `file-001`, ...
    pub fn file_descriptors(count: usize) -> Vec<FileDescriptor> {
        (0..count)
            .map(|i| file_descriptor(&format!("file-{:03}", i)))
            .collect()
    }

    /// January 2024.
    pub fn date_range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap_or_default(),
        )
    }

    pub fn source_config() -> SourceConfig {
        SourceConfig {
            cloud_name: "demo".to_string(),
            api_key: "source-key".to_string(),
            api_secret: "source-secret".to_string(),
            api_base: None,
        }
    }

    pub fn destination_config() -> DestinationConfig {
        DestinationConfig::new("test-zone", "dest-key")
    }

    /// Credential store with both configs registered for [`ACCOUNT_ID`].
    pub fn credentials() -> MockCredentialStore {
        let store = MockCredentialStore::new();
        store.set_source(ACCOUNT_ID, source_config());
        store.set_destination(ACCOUNT_ID, destination_config());
        store
    }
}
