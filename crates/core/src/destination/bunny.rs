//! Bunny storage zone backend.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::credentials::DestinationConfig;
use crate::transfer::TransferError;

use super::naming::{public_url, DEFAULT_ROOT_FOLDER};
use super::{DestinationConnector, DestinationError, DestinationStore};

/// Per-request bound on an upload.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

const PRIMARY_HOST: &str = "storage.bunnycdn.com";
const REGIONS: &[&str] = &["ny", "la", "sg", "uk", "se", "br", "jh", "syd"];

/// Storage API base URL for a region code. Unknown codes use the primary host.
pub fn region_endpoint(region: &str) -> String {
    let region = region.trim().to_ascii_lowercase();
    if REGIONS.contains(&region.as_str()) {
        format!("https://{}.{}", region, PRIMARY_HOST)
    } else {
        format!("https://{}", PRIMARY_HOST)
    }
}

/// Uploads objects into one storage zone.
pub struct BunnyStorage {
    client: Client,
    base_url: String,
    storage_zone: String,
    api_key: String,
    folder: String,
    pull_zone: Option<String>,
}

impl BunnyStorage {
    pub fn new(client: Client, config: &DestinationConfig) -> Result<Self, DestinationError> {
        if config.storage_zone.trim().is_empty() {
            return Err(DestinationError::InvalidConfig(
                "storage zone is empty".to_string(),
            ));
        }
        if config.api_key.is_empty() {
            return Err(DestinationError::InvalidConfig(
                "api key is empty".to_string(),
            ));
        }

        let base_url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| region_endpoint(&config.region));
        let folder = config
            .root_folder
            .as_deref()
            .map(|f| f.trim_matches('/'))
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_ROOT_FOLDER)
            .to_string();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            storage_zone: config.storage_zone.trim().to_string(),
            api_key: config.api_key.clone(),
            folder,
            pull_zone: config.pull_zone.clone().filter(|p| !p.trim().is_empty()),
        })
    }

    /// Folder objects are placed in.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Storage URL of an object.
    pub fn object_url(&self, file_name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            urlencoding::encode(&self.storage_zone),
            self.folder,
            urlencoding::encode(file_name)
        )
    }
}

#[async_trait]
impl DestinationStore for BunnyStorage {
    fn name(&self) -> &str {
        "bunny"
    }

    async fn put(&self, file_name: &str, body: Bytes) -> Result<String, TransferError> {
        let url = self.object_url(file_name);
        debug!(url = %url, bytes = body.len(), "Uploading object");

        let response = self
            .client
            .put(&url)
            .header("AccessKey", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .timeout(UPLOAD_TIMEOUT)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::from_status(
                status.as_u16(),
                body.chars().take(200).collect::<String>(),
            ));
        }

        Ok(url)
    }

    fn public_url(&self, file_name: &str) -> Option<String> {
        self.pull_zone
            .as_deref()
            .map(|zone| public_url(zone, &self.folder, file_name))
    }
}

/// Builds a [`BunnyStorage`] per account, sharing one HTTP client.
pub struct BunnyConnector {
    client: Client,
}

impl Default for BunnyConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl BunnyConnector {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl DestinationConnector for BunnyConnector {
    fn connect(
        &self,
        config: &DestinationConfig,
    ) -> Result<Arc<dyn DestinationStore>, DestinationError> {
        Ok(Arc::new(BunnyStorage::new(self.client.clone(), config)?))
    }
}
