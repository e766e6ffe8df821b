use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skymover_core::{
    load_config, validate_config, BatchProcessor, BunnyConnector, CloudinaryConnector,
    CoordinatorConfig, CredentialStore, HttpFetcher, JobStore, SqliteJobStore,
    StaticCredentialStore, SyncCoordinator, SyncService, WorkerPool,
};
use skymover_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SKYMOVER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Accounts configured: {}", config.accounts.len());

    let job_store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    info!("Job store initialized");

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(StaticCredentialStore::from_accounts(&config.accounts));
    let fetcher = Arc::new(HttpFetcher::new());
    let destinations = Arc::new(BunnyConnector::new());

    let coordinator_config = CoordinatorConfig::from_sync_config(&config.sync);
    let (events, _) = broadcast::channel(coordinator_config.event_capacity);

    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let worker_count = config.cluster.sync_worker_count(available);

    let mut sync = SyncService::new(
        config.sync.clone(),
        Arc::clone(&job_store),
        Arc::clone(&credentials),
        Arc::new(CloudinaryConnector::new()),
        fetcher.clone(),
        destinations.clone(),
        events.clone(),
    );

    // Start the coordinator and its workers unless distribution is off
    let cluster = if worker_count > 0 {
        let coordinator =
            SyncCoordinator::spawn(coordinator_config, Arc::clone(&job_store), events.clone());
        let processor = Arc::new(BatchProcessor::new(
            Arc::clone(&credentials),
            fetcher,
            destinations,
        ));
        let pool = WorkerPool::spawn(&coordinator, processor, worker_count)
            .await
            .context("Failed to start sync workers")?;
        info!("Sync coordinator started with {} workers", worker_count);
        sync = sync.with_coordinator(coordinator.clone());
        Some((coordinator, pool))
    } else {
        info!("Worker pool disabled, all jobs run in process");
        None
    };

    let state = Arc::new(AppState::new(config.clone(), sync));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if let Some((coordinator, pool)) = cluster {
        pool.shutdown().await;
        coordinator.shutdown();
        info!("Sync coordinator stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
