use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    database::deposits,
    error::AppError,
    guards::{ActiveUser, Moderator},
    models::Deposit,
    services::deposits::{DepositUpdate, NewDeposit, Verified, create, delete, update, verify},
    state::State as AppState,
    utils::AppJson,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler).post(create_handler))
        .route("/pending", get(pending_handler))
        .route("/user/{user_id}", get(user_handler))
        .route(
            "/{id}",
            get(get_handler).patch(update_handler).delete(delete_handler),
        )
        .route("/{id}/verify", post(verify_handler))
        .route("/{id}/reject", post(reject_handler))
}

async fn create_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    AppJson(new): AppJson<NewDeposit>,
) -> Result<impl IntoResponse, AppError> {
    let deposit = create(&state.database, user.id, new)?;

    Ok((StatusCode::CREATED, AppJson(deposit)))
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
) -> Result<AppJson<Vec<Deposit>>, AppError> {
    Ok(AppJson(state.database.read(|connection| {
        deposits::list_for_user(connection, user.id)
    })?))
}

async fn pending_handler(
    State(state): State<Arc<AppState>>,
    _: Moderator,
) -> Result<AppJson<Vec<Deposit>>, AppError> {
    Ok(AppJson(state.database.read(deposits::list_pending)?))
}

async fn user_handler(
    State(state): State<Arc<AppState>>,
    _: Moderator,
    Path(user_id): Path<Uuid>,
) -> Result<AppJson<Vec<Deposit>>, AppError> {
    Ok(AppJson(state.database.read(|connection| {
        deposits::list_for_user(connection, user_id)
    })?))
}

/// Owners see their own deposits, staff see all.
async fn get_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<AppJson<Deposit>, AppError> {
    state
        .database
        .read(|connection| deposits::find(connection, id))?
        .filter(|deposit| deposit.user_id == user.id || user.is_staff())
        .map(AppJson)
        .ok_or(AppError::NotFound("Deposit"))
}

async fn update_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
    AppJson(changes): AppJson<DepositUpdate>,
) -> Result<AppJson<Deposit>, AppError> {
    Ok(AppJson(update(&state.database, user.id, id, changes)?))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    delete(&state.database, user.id, id)?;

    Ok(StatusCode::NO_CONTENT)
}

async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Moderator(moderator): Moderator,
    Path(id): Path<Uuid>,
) -> Result<AppJson<Verified>, AppError> {
    Ok(AppJson(verify(&state.database, &moderator.email, id, true)?))
}

async fn reject_handler(
    State(state): State<Arc<AppState>>,
    Moderator(moderator): Moderator,
    Path(id): Path<Uuid>,
) -> Result<AppJson<Verified>, AppError> {
    Ok(AppJson(verify(&state.database, &moderator.email, id, false)?))
}
