use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let sync = &config.sync;
    if !(1..=10).contains(&sync.batch_size) {
        return Err(ConfigError::ValidationError(
            "sync.batch_size must be between 1 and 10".to_string(),
        ));
    }
    if sync.worker_batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "sync.worker_batch_size cannot be 0".to_string(),
        ));
    }
    if !(1..=5).contains(&sync.download_retries) || !(1..=5).contains(&sync.upload_retries) {
        return Err(ConfigError::ValidationError(
            "sync retries must be between 1 and 5".to_string(),
        ));
    }
    if !(10..=120).contains(&sync.download_timeout_secs) {
        return Err(ConfigError::ValidationError(
            "sync.download_timeout_secs must be between 10 and 120".to_string(),
        ));
    }
    if sync.max_workers == 0 {
        return Err(ConfigError::ValidationError(
            "sync.max_workers cannot be 0".to_string(),
        ));
    }
    if sync.max_list_pages == 0 {
        return Err(ConfigError::ValidationError(
            "sync.max_list_pages cannot be 0".to_string(),
        ));
    }

    let cluster = &config.cluster;
    if !(0.0..=1.0).contains(&cluster.worker_ratio) {
        return Err(ConfigError::ValidationError(
            "cluster.worker_ratio must be between 0 and 1".to_string(),
        ));
    }
    if cluster.min_workers > cluster.max_workers {
        return Err(ConfigError::ValidationError(
            "cluster.min_workers cannot exceed cluster.max_workers".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for account in &config.accounts {
        if account.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "account id cannot be empty".to_string(),
            ));
        }
        if !seen.insert(account.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate account id: {}",
                account.id
            )));
        }
        if let Some(dest) = &account.destination {
            if dest.storage_zone.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "account {}: destination.storage_zone cannot be empty",
                    account.id
                )));
            }
        }
    }

    Ok(())
}
