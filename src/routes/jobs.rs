use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use std::path::{Path as FsPath, PathBuf};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{JobRecord, Phase};
use crate::models::submission::{SubmitBatchRequest, SubmitResponse};
use crate::services::source::{has_image_extension, ImageSource, LocalFiles, RemoteImages, UploadDir};

fn accepted(job_id: Uuid, count: usize) -> Json<SubmitResponse> {
    Json(SubmitResponse {
        job_id,
        phase: Phase::Queued,
        message: format!("Batch of {} images submitted for classification", count),
    })
}

/// POST /api/v1/jobs — Classify local files or remote URLs.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(request): Json<SubmitBatchRequest>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    if let Err(report) = request.validate() {
        tracing::debug!(errors = %report, "Rejected batch submission");
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let SubmitBatchRequest {
        image_paths,
        image_urls,
    } = request;

    let (source, count): (Box<dyn ImageSource>, usize) = match (image_paths.is_empty(), image_urls.is_empty()) {
        (false, false) => return Err(StatusCode::BAD_REQUEST),
        (true, false) => {
            let count = image_urls.len();
            let source = RemoteImages::new(state.http.clone(), image_urls)
                .map_err(|e| {
                    tracing::error!(error = %e, "Could not prepare download directory");
                    StatusCode::INTERNAL_SERVER_ERROR
                })?
                .with_max_bytes(state.max_download_bytes);
            (Box::new(source), count)
        }
        _ => {
            let count = image_paths.len();
            let paths = image_paths.into_iter().map(PathBuf::from).collect();
            (Box::new(LocalFiles::new(paths)), count)
        }
    };

    let job_id = state.pipeline.submit(source);
    Ok(accepted(job_id, count))
}

/// POST /api/v1/upload — Upload images (repeated `images` fields) for classification.
pub async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let upload = UploadDir::create().map_err(|e| {
        tracing::error!(error = %e, "Could not create upload directory");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut saved = 0;
    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        if field.name() != Some("images") {
            continue;
        }
        let file_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        if !has_image_extension(FsPath::new(&file_name)) {
            tracing::debug!(file = %file_name, "Skipping upload without an image extension");
            continue;
        }
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;

        match upload.save(&file_name, &data).await {
            Ok(Some(_)) => saved += 1,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(error = %e, "Failed to store uploaded file");
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    if saved == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let job_id = state.pipeline.submit(Box::new(upload));
    Ok(accepted(job_id, saved))
}

/// GET /api/v1/jobs/{job_id} — Current state of a batch.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobRecord>, StatusCode> {
    state
        .registry
        .get(&job_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
