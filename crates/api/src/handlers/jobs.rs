//! Handlers for the `/jobs` resource.
//!
//! Routes:
//! - `GET /api/v1/jobs/{id}`       — job status (queued/completed/failed)
//! - `GET /api/v1/jobs/{id}/image` — finished image bytes

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/jobs/{id}
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let status = state
        .jobs
        .status(job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id}")))?;

    Ok(Json(DataResponse { data: status }))
}

/// GET /api/v1/jobs/{id}/image
///
/// The response body is the raw backend output (a ZIP archive containing
/// the PNG); the adapter unpacks and delivers it to the chat.
pub async fn job_image(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let bytes = state
        .jobs
        .image(job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Image for job {job_id}")))?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}
