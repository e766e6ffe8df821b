//! Destination storage providers.
//!
//! A [`DestinationStore`] accepts object bytes under a name and returns the
//! URL the object was stored at. Stores are built per account by a
//! [`DestinationConnector`] from decrypted credentials.

mod bunny;
mod naming;

pub use bunny::{region_endpoint, BunnyConnector, BunnyStorage, UPLOAD_TIMEOUT};
pub use naming::{public_url, sanitize_file_name, strip_scheme, DEFAULT_ROOT_FOLDER};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::credentials::DestinationConfig;
use crate::transfer::TransferError;

/// Errors building a destination store.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("invalid destination configuration: {0}")]
    InvalidConfig(String),
}

/// Object storage that transferred files are written to.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Store `body` as `file_name` under the configured folder.
    async fn put(&self, file_name: &str, body: Bytes) -> Result<String, TransferError>;

    /// Public URL of a stored file, when a pull zone is configured.
    fn public_url(&self, file_name: &str) -> Option<String>;
}

/// Creates a [`DestinationStore`] from account credentials.
pub trait DestinationConnector: Send + Sync {
    fn connect(
        &self,
        config: &DestinationConfig,
    ) -> Result<Arc<dyn DestinationStore>, DestinationError>;
}
