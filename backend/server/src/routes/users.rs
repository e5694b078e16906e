use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use tracing::info;
use uuid::Uuid;

use super::blocking;
use crate::{
    database::users,
    error::AppError,
    guards::{ActiveUser, CurrentUser},
    models::User,
    services::users::{ProfileUpdate, update_profile},
    state::State as AppState,
    utils::AppJson,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/me",
            get(me_handler).patch(update_me_handler).delete(delete_me_handler),
        )
        .route("/{id}", get(user_handler))
}

async fn me_handler(current: CurrentUser) -> AppJson<User> {
    AppJson(current.user)
}

async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    AppJson(update): AppJson<ProfileUpdate>,
) -> Result<AppJson<User>, AppError> {
    let database = state.database.clone();
    let rounds = state.config.password_hash_rounds;

    Ok(AppJson(
        blocking(move || update_profile(&database, user, &update, rounds)).await?,
    ))
}

async fn delete_me_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
) -> Result<StatusCode, AppError> {
    state
        .database
        .write(|transaction| users::delete(transaction, user.id))?;

    info!(user_id = %user.id, "User deleted their account");

    Ok(StatusCode::NO_CONTENT)
}

async fn user_handler(
    State(state): State<Arc<AppState>>,
    _: ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<AppJson<User>, AppError> {
    state
        .database
        .read(|connection| users::find_by_id(connection, id))?
        .map(AppJson)
        .ok_or(AppError::NotFound("User"))
}
