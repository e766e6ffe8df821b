//! Per-account credentials for source and destination stores.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AccountConfig;

/// Errors from credential lookup.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("source credentials not configured for account {0}")]
    SourceNotConfigured(String),

    #[error("destination credentials not configured for account {0}")]
    DestinationNotConfigured(String),
}

/// Destination (Bunny storage zone) settings for an account.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DestinationConfig {
    pub storage_zone: String,
    pub api_key: String,
    /// Region code; `de` is the primary endpoint.
    #[serde(default = "default_region")]
    pub region: String,
    /// Full base URL override, e.g. for a local test server.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Folder every object is placed under.
    #[serde(default)]
    pub root_folder: Option<String>,
    /// Pull zone host used to build public URLs.
    #[serde(default)]
    pub pull_zone: Option<String>,
}

fn default_region() -> String {
    "de".to_string()
}

impl DestinationConfig {
    pub fn new(storage_zone: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            storage_zone: storage_zone.into(),
            api_key: api_key.into(),
            region: default_region(),
            endpoint: None,
            root_folder: None,
            pull_zone: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_root_folder(mut self, folder: impl Into<String>) -> Self {
        self.root_folder = Some(folder.into());
        self
    }

    pub fn with_pull_zone(mut self, pull_zone: impl Into<String>) -> Self {
        self.pull_zone = Some(pull_zone.into());
        self
    }
}

/// Source (Cloudinary) settings for an account.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Admin API base URL override.
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Looks up credentials for an account.
pub trait CredentialStore: Send + Sync {
    fn destination_config(&self, account_id: &str) -> Result<DestinationConfig, CredentialError>;

    fn source_config(&self, account_id: &str) -> Result<SourceConfig, CredentialError>;
}

/// Credentials loaded once from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    sources: HashMap<String, SourceConfig>,
    destinations: HashMap<String, DestinationConfig>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accounts(accounts: &[AccountConfig]) -> Self {
        let mut store = Self::new();
        for account in accounts {
            if let Some(source) = &account.source {
                store.sources.insert(account.id.clone(), source.clone());
            }
            if let Some(dest) = &account.destination {
                store.destinations.insert(account.id.clone(), dest.clone());
            }
        }
        store
    }

    pub fn with_source(mut self, account_id: impl Into<String>, config: SourceConfig) -> Self {
        self.sources.insert(account_id.into(), config);
        self
    }

    pub fn with_destination(
        mut self,
        account_id: impl Into<String>,
        config: DestinationConfig,
    ) -> Self {
        self.destinations.insert(account_id.into(), config);
        self
    }
}

impl CredentialStore for StaticCredentialStore {
    fn destination_config(&self, account_id: &str) -> Result<DestinationConfig, CredentialError> {
        self.destinations
            .get(account_id)
            .cloned()
            .ok_or_else(|| CredentialError::DestinationNotConfigured(account_id.to_string()))
    }

    fn source_config(&self, account_id: &str) -> Result<SourceConfig, CredentialError> {
        self.sources
            .get(account_id)
            .cloned()
            .ok_or_else(|| CredentialError::SourceNotConfigured(account_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_store_from_accounts() {
        let accounts = vec![
            AccountConfig {
                id: "full".to_string(),
                source: Some(SourceConfig {
                    cloud_name: "demo".to_string(),
                    api_key: "k".to_string(),
                    api_secret: "s".to_string(),
                    api_base: None,
                }),
                destination: Some(DestinationConfig::new("zone", "key")),
            },
            AccountConfig {
                id: "source-only".to_string(),
                source: None,
                destination: None,
            },
        ];
        let store = StaticCredentialStore::from_accounts(&accounts);

        assert_eq!(
            store.destination_config("full").unwrap().storage_zone,
            "zone"
        );
        assert_eq!(store.source_config("full").unwrap().cloud_name, "demo");
        assert!(matches!(
            store.destination_config("source-only"),
            Err(CredentialError::DestinationNotConfigured(_))
        ));
        assert!(matches!(
            store.source_config("missing"),
            Err(CredentialError::SourceNotConfigured(_))
        ));
    }

    #[test]
    fn test_destination_defaults_to_primary_region() {
        let config: DestinationConfig =
            toml::from_str("storage_zone = \"z\"\napi_key = \"k\"").unwrap();
        assert_eq!(config.region, "de");
        assert!(config.root_folder.is_none());
    }
}
