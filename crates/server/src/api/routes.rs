use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{cluster, handlers, jobs, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Sync jobs
        .route(
            "/accounts/{account}/jobs",
            post(jobs::start_job).get(jobs::list_jobs),
        )
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/abandon", post(jobs::abandon_job))
        // Worker pool
        .route("/cluster", get(cluster::get_cluster));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
