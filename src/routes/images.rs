use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use image::ImageFormat;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::Partition;
use crate::services::storage::StorageError;

/// GET /api/v1/jobs/{job_id}/images/{category}/{filename} — An image sorted by a batch.
pub async fn serve_image(
    State(state): State<AppState>,
    Path((job_id, category, filename)): Path<(Uuid, String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    let partition: Partition = category.parse().map_err(|_| StatusCode::NOT_FOUND)?;

    let bytes = state
        .store
        .read(&job_id, partition, &filename)
        .await
        .map_err(|e| match e {
            StorageError::NotFound(_) | StorageError::InvalidName(_) => StatusCode::NOT_FOUND,
            StorageError::Io(e) => {
                tracing::error!(error = %e, job_id = %job_id, file = %filename, "Failed to read stored image");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    let content_type = ImageFormat::from_path(&filename)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
