use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::credentials::{DestinationConfig, SourceConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Accounts whose source and destination credentials are known.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("skymover.db")
}

/// Sync tuning. Request values are clamped into these bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Files per batch in single-process mode (1-10).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Files per batch when distributing to workers.
    #[serde(default = "default_worker_batch_size")]
    pub worker_batch_size: usize,
    /// Download attempts per file (1-5).
    #[serde(default = "default_retries")]
    pub download_retries: u32,
    /// Upload attempts per file (1-5).
    #[serde(default = "default_retries")]
    pub upload_retries: u32,
    /// Per-attempt download timeout (10-120).
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Upper bound on workers a single job may hold.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Jobs with more files than this are distributed when workers exist.
    #[serde(default = "default_distribution_threshold")]
    pub distribution_threshold: usize,
    /// A distributed job with no worker report for this long is failed.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
    /// Hard stop for source listing pagination.
    #[serde(default = "default_max_list_pages")]
    pub max_list_pages: usize,
    /// Pause between listing pages.
    #[serde(default = "default_list_page_delay_ms")]
    pub list_page_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            worker_batch_size: default_worker_batch_size(),
            download_retries: default_retries(),
            upload_retries: default_retries(),
            download_timeout_secs: default_download_timeout_secs(),
            max_workers: default_max_workers(),
            distribution_threshold: default_distribution_threshold(),
            stall_timeout_secs: default_stall_timeout_secs(),
            max_list_pages: default_max_list_pages(),
            list_page_delay_ms: default_list_page_delay_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    3
}

fn default_worker_batch_size() -> usize {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_download_timeout_secs() -> u64 {
    45
}

fn default_max_workers() -> usize {
    4
}

fn default_distribution_threshold() -> usize {
    20
}

fn default_stall_timeout_secs() -> u64 {
    300
}

fn default_max_list_pages() -> usize {
    1000
}

fn default_list_page_delay_ms() -> u64 {
    200
}

/// Worker pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Spawn in-process workers and distribute large jobs.
    #[serde(default = "default_cluster_enabled")]
    pub enabled: bool,
    /// Explicit worker count. When unset, derived from available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Fraction of available parallelism given to sync workers.
    #[serde(default = "default_worker_ratio")]
    pub worker_ratio: f64,
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_cluster_max_workers")]
    pub max_workers: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: default_cluster_enabled(),
            workers: None,
            worker_ratio: default_worker_ratio(),
            min_workers: default_min_workers(),
            max_workers: default_cluster_max_workers(),
        }
    }
}

impl ClusterConfig {
    /// Number of sync workers to spawn given `available` CPU parallelism.
    pub fn sync_worker_count(&self, available: usize) -> usize {
        if !self.enabled {
            return 0;
        }
        if let Some(workers) = self.workers {
            return workers;
        }
        let derived = (available as f64 * self.worker_ratio).round() as usize;
        derived.clamp(self.min_workers, self.max_workers.max(self.min_workers))
    }
}

fn default_cluster_enabled() -> bool {
    true
}

fn default_worker_ratio() -> f64 {
    0.3
}

fn default_min_workers() -> usize {
    1
}

fn default_cluster_max_workers() -> usize {
    4
}

/// Credentials for one account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    pub id: String,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub destination: Option<DestinationConfig>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub cluster: ClusterConfig,
    pub accounts: Vec<SanitizedAccountConfig>,
}

/// Account with secrets hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAccountConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_cloud: Option<String>,
    pub source_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub destination_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            sync: config.sync.clone(),
            cluster: config.cluster.clone(),
            accounts: config
                .accounts
                .iter()
                .map(|a| SanitizedAccountConfig {
                    id: a.id.clone(),
                    source_cloud: a.source.as_ref().map(|s| s.cloud_name.clone()),
                    source_configured: a
                        .source
                        .as_ref()
                        .is_some_and(|s| !s.api_key.is_empty() && !s.api_secret.is_empty()),
                    storage_zone: a.destination.as_ref().map(|d| d.storage_zone.clone()),
                    region: a.destination.as_ref().map(|d| d.region.clone()),
                    destination_configured: a
                        .destination
                        .as_ref()
                        .is_some_and(|d| !d.api_key.is_empty()),
                })
                .collect(),
        }
    }
}
