use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod images;
pub mod jobs;
pub mod metrics;

/// API routes without the metrics endpoint, which needs the process-wide
/// Prometheus recorder.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/jobs", post(jobs::submit_batch))
        .route("/api/v1/upload", post(jobs::upload_images))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job_status))
        .route(
            "/api/v1/jobs/{job_id}/images/{category}/{filename}",
            get(images::serve_image),
        )
        .with_state(state)
}
