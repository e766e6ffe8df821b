//! Core of skymover: bulk migration of media files from a source provider
//! into CDN object storage.
//!
//! A sync job lists every file created in a date range, then downloads and
//! re-uploads each one with independent retry policies. Small jobs run in
//! process; large ones are split into batches and distributed to a pool of
//! workers by the [`coordinator`].

pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod destination;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod source;
pub mod sync;
pub mod testing;
pub mod transfer;
pub mod worker;

pub use config::{
    load_config, load_config_from_str, validate_config, AccountConfig, ClusterConfig, Config,
    ConfigError, DatabaseConfig, SanitizedConfig, SyncConfig,
};
pub use coordinator::{
    ClusterStats, CoordinatorConfig, CoordinatorError, JobSummary, SyncCoordinator, SyncEvent,
    WorkerPool,
};
pub use credentials::{
    CredentialError, CredentialStore, DestinationConfig, SourceConfig, StaticCredentialStore,
};
pub use destination::{BunnyConnector, DestinationConnector, DestinationStore};
pub use job::{
    DateRange, FailureCategory, FileDescriptor, JobFilter, JobStatus, JobStore, SqliteJobStore,
    StoreError, SyncJob, SyncLogEntry, TransferResult,
};
pub use orchestrator::{LocalOrchestrator, OrchestratorConfig};
pub use source::{CloudinaryConnector, SourceConnector, SourceLister};
pub use sync::{SyncError, SyncMode, SyncProgress, SyncReport, SyncRequest, SyncService};
pub use transfer::{HttpFetcher, RetryPolicy, SourceFetcher, TransferOptions, TransferPipeline};
pub use worker::{BatchProcessor, WorkerId};
