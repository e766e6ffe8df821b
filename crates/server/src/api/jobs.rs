//! Sync job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use skymover_core::{
    DateRange, JobFilter, JobStatus, SyncError, SyncJob, SyncProgress, SyncRequest,
};

use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 500;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 50;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a sync job
#[derive(Debug, Deserialize)]
pub struct StartJobBody {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub batch_size: Option<usize>,
    pub download_retries: Option<u32>,
    pub upload_retries: Option<u32>,
    pub download_timeout_secs: Option<u64>,
    pub max_workers: Option<usize>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// Request body for abandoning a job
#[derive(Debug, Default, Deserialize)]
pub struct AbandonJobBody {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<SyncJob>,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct AbandonJobResponse {
    pub job_id: String,
    pub abandoned: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<JobErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(JobErrorResponse {
            error: error.into(),
        }),
    )
}

fn sync_error(e: SyncError) -> ApiError {
    let status = match &e {
        SyncError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        SyncError::AlreadyRunning => StatusCode::CONFLICT,
        SyncError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a sync job in the background
pub async fn start_job(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    Json(body): Json<StartJobBody>,
) -> Result<(StatusCode, Json<SyncJob>), ApiError> {
    let request = SyncRequest {
        account_id: account,
        range: DateRange::new(body.start_date, body.end_date),
        batch_size: body.batch_size,
        download_retries: body.download_retries,
        upload_retries: body.upload_retries,
        download_timeout_secs: body.download_timeout_secs,
        max_workers: body.max_workers,
    };

    let job = state.sync().start_sync(request).await.map_err(sync_error)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Get a job with its log and percent done
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SyncProgress>, ApiError> {
    state
        .sync()
        .get_sync_progress(&id)
        .map(Json)
        .map_err(sync_error)
}

/// List an account's jobs, newest first
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let mut filter = JobFilter::new().with_account(account).with_limit(limit);

    if let Some(status) = params.status.as_deref() {
        let status = JobStatus::parse(status).ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Unknown job status: {}", status),
            )
        })?;
        filter = filter.with_status(status);
    }

    let jobs = state.sync().list_jobs(&filter).map_err(sync_error)?;
    Ok(Json(ListJobsResponse { jobs, limit }))
}

/// Fail a job running on the worker pool
pub async fn abandon_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<AbandonJobBody>>,
) -> Result<Json<AbandonJobResponse>, ApiError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "Abandoned by operator".to_string());

    let abandoned = state
        .sync()
        .abandon(&id, &reason)
        .await
        .map_err(sync_error)?;
    if !abandoned {
        warn!(job_id = %id, "Abandon requested for job not on the worker pool");
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("Job {} is not running on the worker pool", id),
        ));
    }

    Ok(Json(AbandonJobResponse {
        job_id: id,
        abandoned,
    }))
}
