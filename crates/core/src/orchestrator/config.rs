//! Single-process orchestrator configuration.

use std::time::Duration;

use crate::config::SyncConfig;
use crate::transfer::TransferOptions;

/// Longest pause between two local batches.
const MAX_BATCH_DELAY: Duration = Duration::from_millis(2000);
const DELAY_PER_FILE: Duration = Duration::from_millis(500);

/// How a local run batches and paces its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Files attempted concurrently per batch.
    pub batch_size: usize,
    pub options: TransferOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            options: TransferOptions::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_sync_config(config: &SyncConfig, options: TransferOptions) -> Self {
        Self {
            batch_size: config.batch_size.clamp(1, 10),
            options,
        }
    }

    /// Pause after each batch except the last: `min(2000ms, 500ms * batch_size)`.
    pub fn batch_delay(&self) -> Duration {
        (DELAY_PER_FILE * self.batch_size as u32).min(MAX_BATCH_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_delay_is_capped() {
        let delay = |batch_size| {
            OrchestratorConfig {
                batch_size,
                ..OrchestratorConfig::default()
            }
            .batch_delay()
        };
        assert_eq!(delay(1), Duration::from_millis(500));
        assert_eq!(delay(3), Duration::from_millis(1500));
        assert_eq!(delay(4), Duration::from_millis(2000));
        assert_eq!(delay(10), Duration::from_millis(2000));
    }

    #[test]
    fn test_from_sync_config_clamps_batch_size() {
        let sync = SyncConfig {
            batch_size: 50,
            ..SyncConfig::default()
        };
        let config = OrchestratorConfig::from_sync_config(&sync, TransferOptions::default());
        assert_eq!(config.batch_size, 10);
    }
}
