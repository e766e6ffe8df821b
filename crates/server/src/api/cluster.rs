//! Worker pool API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use skymover_core::ClusterStats;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    /// False when jobs always run in process.
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ClusterStats>,
}

#[derive(Debug, Serialize)]
pub struct ClusterErrorResponse {
    pub error: String,
}

/// Worker counts and current batch assignments
pub async fn get_cluster(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClusterResponse>, (StatusCode, Json<ClusterErrorResponse>)> {
    match state.sync().cluster_stats().await {
        Ok(stats) => Ok(Json(ClusterResponse {
            enabled: stats.is_some(),
            stats,
        })),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ClusterErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
