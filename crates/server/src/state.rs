use skymover_core::{Config, SanitizedConfig, SyncService};

/// Shared application state
pub struct AppState {
    config: Config,
    sync: SyncService,
}

impl AppState {
    pub fn new(config: Config, sync: SyncService) -> Self {
        Self { config, sync }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn sync(&self) -> &SyncService {
        &self.sync
    }
}
