use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    database::notifications,
    error::AppError,
    guards::ActiveUser,
    models::Notification,
    state::State as AppState,
    utils::AppJson,
};

#[derive(Deserialize)]
pub struct ListFilter {
    #[serde(default)]
    unread_only: bool,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler))
        .route("/unread-count", get(unread_count_handler))
        .route("/read-all", post(read_all_handler))
        .route("/{id}/read", post(read_handler))
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Query(filter): Query<ListFilter>,
) -> Result<AppJson<Vec<Notification>>, AppError> {
    Ok(AppJson(state.database.read(|connection| {
        notifications::list_for_user(connection, user.id, filter.unread_only)
    })?))
}

async fn unread_count_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
) -> Result<AppJson<Value>, AppError> {
    let count = state
        .database
        .read(|connection| notifications::unread_count(connection, user.id))?;

    Ok(AppJson(json!({ "count": count })))
}

async fn read_all_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
) -> Result<AppJson<Value>, AppError> {
    let marked = state
        .database
        .write(|transaction| notifications::mark_all_read(transaction, user.id))?;

    Ok(AppJson(json!({ "marked_read": marked })))
}

async fn read_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .database
        .write(|transaction| notifications::mark_read(transaction, user.id, id))?;

    Ok(StatusCode::NO_CONTENT)
}
