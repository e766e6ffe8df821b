//! Prometheus metrics for the HTTP server.
//!
//! HTTP request metrics live here, worker pool gauges are refreshed from the
//! coordinator on every scrape, and the transfer and job counters come from
//! `skymover_core::metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "skymover_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("skymover_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "skymover_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Worker Pool Metrics (collected dynamically)
// =============================================================================

pub static SYNC_WORKERS_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "skymover_sync_workers_total",
        "Number of registered sync workers",
    )
    .unwrap()
});

pub static SYNC_WORKERS_AVAILABLE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "skymover_sync_workers_available",
        "Number of sync workers without a batch",
    )
    .unwrap()
});

/// Jobs currently distributed to the worker pool.
pub static SYNC_JOBS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "skymover_sync_jobs_active",
        "Number of jobs running on the worker pool",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Worker pool
    registry
        .register(Box::new(SYNC_WORKERS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(SYNC_WORKERS_AVAILABLE.clone()))
        .unwrap();
    registry
        .register(Box::new(SYNC_JOBS_ACTIVE.clone()))
        .unwrap();

    // Core metrics (transfers, batches, jobs)
    for metric in skymover_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Refresh the worker pool gauges before encoding.
pub async fn collect_dynamic_metrics(state: &AppState) {
    match state.sync().cluster_stats().await {
        Ok(Some(stats)) => {
            SYNC_WORKERS_TOTAL.set(stats.total_workers as i64);
            SYNC_WORKERS_AVAILABLE.set(stats.available_workers as i64);
            SYNC_JOBS_ACTIVE.set(stats.active_jobs as i64);
        }
        Ok(None) => {
            SYNC_WORKERS_TOTAL.set(0);
            SYNC_WORKERS_AVAILABLE.set(0);
            SYNC_JOBS_ACTIVE.set(0);
        }
        Err(e) => warn!(error = %e, "Failed to collect worker pool metrics"),
    }
}

static UUID_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}").ok()
});

static NUMERIC_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/\d+(/|$)").ok());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let mut result = path.to_string();
    if let Some(re) = UUID_RE.as_ref() {
        result = re.replace_all(&result, "{id}").into_owned();
    }
    if let Some(re) = NUMERIC_RE.as_ref() {
        result = re.replace_all(&result, "/{id}$1").into_owned();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_uuid_with_suffix() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000/abandon";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}/abandon");
    }

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/accounts/12345/jobs";
        assert_eq!(normalize_path(path), "/api/v1/accounts/{id}/jobs");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/accounts/acme/jobs";
        assert_eq!(normalize_path(path), "/api/v1/accounts/acme/jobs");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("skymover_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_worker_gauges_and_core_metrics() {
        SYNC_WORKERS_TOTAL.set(0);
        SYNC_WORKERS_AVAILABLE.set(0);
        SYNC_JOBS_ACTIVE.set(0);
        skymover_core::metrics::WORKERS_LOST.inc_by(0);

        let output = encode_metrics();

        assert!(output.contains("skymover_sync_workers_total"));
        assert!(output.contains("skymover_sync_workers_available"));
        assert!(output.contains("skymover_sync_jobs_active"));
        assert!(output.contains("skymover_workers_lost_total"));
    }
}
