//! Mock credential store for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::credentials::{CredentialError, CredentialStore, DestinationConfig, SourceConfig};

/// Mock implementation of the CredentialStore trait.
///
/// Credentials can be added or removed while a sync runs, and every lookup
/// is counted.
#[derive(Debug, Clone, Default)]
pub struct MockCredentialStore {
    sources: Arc<Mutex<HashMap<String, SourceConfig>>>,
    destinations: Arc<Mutex<HashMap<String, DestinationConfig>>>,
    destination_lookups: Arc<Mutex<usize>>,
}

impl MockCredentialStore {
    /// Create an empty credential store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register source credentials for an account.
    pub fn set_source(&self, account_id: &str, config: SourceConfig) {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account_id.to_string(), config);
    }

    /// Register destination credentials for an account.
    pub fn set_destination(&self, account_id: &str, config: DestinationConfig) {
        self.destinations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account_id.to_string(), config);
    }

    /// Forget an account's destination credentials.
    pub fn remove_destination(&self, account_id: &str) {
        self.destinations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(account_id);
    }

    /// Number of destination lookups so far.
    pub fn destination_lookups(&self) -> usize {
        *self
            .destination_lookups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialStore for MockCredentialStore {
    fn destination_config(&self, account_id: &str) -> Result<DestinationConfig, CredentialError> {
        *self
            .destination_lookups
            .lock()
            .unwrap_or_else(|e| e.into_inner()) += 1;
        self.destinations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(account_id)
            .cloned()
            .ok_or_else(|| CredentialError::DestinationNotConfigured(account_id.to_string()))
    }

    fn source_config(&self, account_id: &str) -> Result<SourceConfig, CredentialError> {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(account_id)
            .cloned()
            .ok_or_else(|| CredentialError::SourceNotConfigured(account_id.to_string()))
    }
}
