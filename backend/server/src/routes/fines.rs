use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{
    database::fines,
    error::AppError,
    guards::{ActiveUser, Moderator},
    models::Fine,
    services::deposits::{NewFine, record_fine},
    state::State as AppState,
    utils::AppJson,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler).post(create_handler))
        .route("/user/{user_id}", get(user_handler))
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
) -> Result<AppJson<Vec<Fine>>, AppError> {
    Ok(AppJson(state.database.read(|connection| {
        fines::list_for_user(connection, user.id)
    })?))
}

async fn user_handler(
    State(state): State<Arc<AppState>>,
    _: Moderator,
    Path(user_id): Path<Uuid>,
) -> Result<AppJson<Vec<Fine>>, AppError> {
    Ok(AppJson(state.database.read(|connection| {
        fines::list_for_user(connection, user_id)
    })?))
}

async fn create_handler(
    State(state): State<Arc<AppState>>,
    _: Moderator,
    AppJson(new): AppJson<NewFine>,
) -> Result<impl IntoResponse, AppError> {
    let fine = record_fine(&state.database, new)?;

    Ok((StatusCode::CREATED, AppJson(fine)))
}
