//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Transfer pipeline (attempts, retries, outcomes)
//! - Coordinator (batches, worker loss, job outcomes)
//! - Source listing

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Transfer Metrics
// =============================================================================

/// Transfer attempts by step ("download", "upload").
pub static TRANSFER_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "skymover_transfer_attempts_total",
            "Total transfer step attempts",
        ),
        &["step"],
    )
    .unwrap()
});

/// Backoff retries by step.
pub static TRANSFER_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "skymover_transfer_retries_total",
            "Total transfer step retries",
        ),
        &["step"],
    )
    .unwrap()
});

/// Files transferred by result ("success" or a failure category).
pub static FILES_TRANSFERRED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("skymover_files_total", "Total files processed by outcome"),
        &["result"],
    )
    .unwrap()
});

/// Bytes uploaded to destinations.
pub static BYTES_UPLOADED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("skymover_bytes_uploaded_total", "Total bytes uploaded").unwrap());

/// Per-file transfer duration in seconds.
pub static TRANSFER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "skymover_transfer_duration_seconds",
            "Duration of a single file transfer",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Coordinator Metrics
// =============================================================================

/// Batches resolved by outcome ("completed", "failed").
pub static BATCHES_RESOLVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("skymover_batches_total", "Total batches resolved"),
        &["result"],
    )
    .unwrap()
});

/// Batches moved off a lost worker.
pub static BATCHES_REASSIGNED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "skymover_batches_reassigned_total",
        "Total in-flight batches reassigned after worker loss",
    )
    .unwrap()
});

/// Workers lost.
pub static WORKERS_LOST: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("skymover_workers_lost_total", "Total sync workers lost").unwrap()
});

/// Jobs finished by final status and mode.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("skymover_jobs_finished_total", "Total sync jobs finished"),
        &["status", "mode"],
    )
    .unwrap()
});

// =============================================================================
// Source Listing Metrics
// =============================================================================

/// Listing pages fetched.
pub static LIST_PAGES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "skymover_list_pages_total",
        "Total source listing pages fetched",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Transfer
        Box::new(TRANSFER_ATTEMPTS.clone()),
        Box::new(TRANSFER_RETRIES.clone()),
        Box::new(FILES_TRANSFERRED.clone()),
        Box::new(BYTES_UPLOADED.clone()),
        Box::new(TRANSFER_DURATION.clone()),
        // Coordinator
        Box::new(BATCHES_RESOLVED.clone()),
        Box::new(BATCHES_REASSIGNED.clone()),
        Box::new(WORKERS_LOST.clone()),
        Box::new(JOBS_FINISHED.clone()),
        // Listing
        Box::new(LIST_PAGES.clone()),
    ]
}
