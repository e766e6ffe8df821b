//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock providers injected, so the HTTP API can be exercised end to end
//! without Cloudinary or Bunny.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::ServiceExt;

use skymover_core::{
    testing::{MockDestination, MockFetcher, MockLister},
    AccountConfig, BatchProcessor, Config, CoordinatorConfig, DatabaseConfig, SqliteJobStore,
    SyncConfig, SyncCoordinator, SyncService, WorkerPool,
};

/// Re-export fixtures for test convenience
pub use skymover_core::testing::fixtures;

/// Test fixture for E2E testing with mock providers.
///
/// Provides an in-process server with fully controllable mocks for:
/// - Source listing (MockLister)
/// - Source downloads (MockFetcher)
/// - Destination uploads (MockDestination)
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub lister: MockLister,
    pub fetcher: MockFetcher,
    pub destination: MockDestination,
    /// Worker pool, when enabled
    pub pool: Option<WorkerPool>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture without a worker pool.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let lister = MockLister::new();
        let fetcher = MockFetcher::new();
        let destination = MockDestination::new();

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            sync: SyncConfig {
                list_page_delay_ms: 0,
                ..SyncConfig::default()
            },
            accounts: vec![AccountConfig {
                id: fixtures::ACCOUNT_ID.to_string(),
                source: Some(fixtures::source_config()),
                destination: Some(fixtures::destination_config()),
            }],
            ..Config::default()
        };

        let store = Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let (events, _) = broadcast::channel(1024);

        let mut sync = SyncService::new(
            config.sync.clone(),
            store.clone(),
            Arc::new(fixtures::credentials()),
            Arc::new(lister.clone()),
            Arc::new(fetcher.clone()),
            Arc::new(destination.clone()),
            events.clone(),
        );

        let pool = if test_config.workers > 0 {
            let coordinator = SyncCoordinator::spawn(
                CoordinatorConfig::from_sync_config(&config.sync),
                store.clone(),
                events,
            );
            let processor = Arc::new(BatchProcessor::new(
                Arc::new(fixtures::credentials()),
                Arc::new(fetcher.clone()),
                Arc::new(destination.clone()),
            ));
            let pool = WorkerPool::spawn(&coordinator, processor, test_config.workers)
                .await
                .expect("Failed to spawn workers");
            wait_for_workers(&coordinator, test_config.workers).await;
            sync = sync.with_coordinator(coordinator);
            Some(pool)
        } else {
            None
        };

        let state = Arc::new(skymover_server::state::AppState::new(config, sync));
        let router = skymover_server::api::create_router(state);

        Self {
            router,
            lister,
            fetcher,
            destination,
            pool,
            temp_dir,
        }
    }

    /// List `count` fixture files and serve their bodies.
    pub async fn list_files(&self, count: usize) {
        let files = fixtures::file_descriptors(count);
        self.lister.set_files(files.clone()).await;
        self.fetcher.serve_files(&files).await;
    }

    /// Start a job for the fixture account over January 2024.
    pub async fn start_job(&self) -> TestResponse {
        self.post(
            &format!("/api/v1/accounts/{}/jobs", fixtures::ACCOUNT_ID),
            serde_json::json!({
                "start_date": "2024-01-01",
                "end_date": "2024-01-31"
            }),
        )
        .await
    }

    /// Poll a job until it reaches a terminal status.
    pub async fn wait_for_job(&self, job_id: &str) -> TestResponse {
        let path = format!("/api/v1/jobs/{}", job_id);
        for _ in 0..200 {
            let response = self.get(&path).await;
            let status = response.body["job"]["status"].as_str().unwrap_or_default();
            if matches!(status, "completed" | "completed_with_errors" | "failed") {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} did not finish in time", job_id);
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a GET request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

async fn wait_for_workers(coordinator: &SyncCoordinator, count: usize) {
    for _ in 0..100 {
        if let Ok(stats) = coordinator.stats().await {
            if stats.total_workers == count {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("workers never became ready");
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Number of sync workers; zero runs every job in process
    pub workers: usize,
}

impl TestConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self { workers }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
