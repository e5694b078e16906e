//! HTTP surface, everything under `/api/v1`.
use std::sync::Arc;

use axum::{Router, routing::get};
use serde_json::{Value, json};
use tokio::task;

use crate::{error::AppError, state::State, utils::AppJson};

pub mod admin;
pub mod auth;
pub mod deposits;
pub mod fines;
pub mod loans;
pub mod notifications;
pub mod ocr;
pub mod policies;
pub mod receipts;
pub mod users;

pub fn api() -> Router<Arc<State>> {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1/auth", auth::router())
        .nest("/api/v1/users", users::router())
        .nest("/api/v1/admin/users", admin::router())
        .nest("/api/v1/policies", policies::router())
        .nest("/api/v1/deposits", deposits::router())
        .nest("/api/v1/fines", fines::router())
        .nest("/api/v1/loans", loans::router())
        .nest("/api/v1/notifications", notifications::router())
        .nest("/api/v1/ocr/jobs", ocr::router())
        .nest("/api/v1/receipts", receipts::router())
}

async fn health_handler() -> AppJson<Value> {
    AppJson(json!({ "status": "ok" }))
}

/// Runs password hashing and similar CPU heavy work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
}

/// `{"message": ...}` body used by endpoints with nothing else to return.
pub(crate) fn message(text: &str) -> AppJson<Value> {
    AppJson(json!({ "message": text }))
}
