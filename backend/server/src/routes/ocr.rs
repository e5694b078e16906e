use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use uuid::Uuid;

use crate::{
    error::AppError, guards::ActiveUser, ocr::JobStatus, state::State as AppState,
    utils::AppJson,
};

/// Largest accepted Tesseract TSV dump.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(submit_handler))
        .route("/{id}", get(status_handler).delete(delete_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    if body.trim().is_empty() {
        return Err(AppError::BadRequest("Empty OCR upload".into()));
    }

    let task_id = state.ocr_jobs.submit(user.id, body)?;

    Ok((
        StatusCode::ACCEPTED,
        AppJson(json!({ "task_id": task_id, "status": "processing" })),
    ))
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<AppJson<JobStatus>, AppError> {
    Ok(AppJson(state.ocr_jobs.status(user.id, id)?))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.ocr_jobs.remove(user.id, id)?;

    Ok(StatusCode::NO_CONTENT)
}
