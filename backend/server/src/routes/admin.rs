//! Account administration. None of these act on the calling admin.
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    database::users,
    error::AppError,
    guards::Admin,
    models::{AccessRole, CooperativeRole, User},
    services::users::ensure_not_self,
    state::State as AppState,
    utils::AppJson,
};

const MAX_PAGE: u32 = 100;

#[derive(Deserialize)]
pub struct Page {
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    MAX_PAGE
}

#[derive(Deserialize)]
pub struct RoleAssignment {
    access_roles: Vec<AccessRole>,
    #[serde(default)]
    cooperative_roles: Option<Vec<CooperativeRole>>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler))
        .route("/{id}", get(get_handler).delete(delete_handler))
        .route("/{id}/roles", put(roles_handler))
        .route("/{id}/toggle-disabled", post(toggle_disabled_handler))
}

fn load(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .database
        .read(|connection| users::find_by_id(connection, id))?
        .ok_or(AppError::NotFound("User"))
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    _: Admin,
    Query(page): Query<Page>,
) -> Result<AppJson<Vec<User>>, AppError> {
    if page.limit > MAX_PAGE {
        return Err(AppError::Validation(format!("limit cannot exceed {MAX_PAGE}")));
    }

    Ok(AppJson(state.database.read(|connection| {
        users::list(connection, page.skip, page.limit)
    })?))
}

async fn get_handler(
    State(state): State<Arc<AppState>>,
    _: Admin,
    Path(id): Path<Uuid>,
) -> Result<AppJson<User>, AppError> {
    Ok(AppJson(load(&state, id)?))
}

async fn roles_handler(
    State(state): State<Arc<AppState>>,
    Admin(admin): Admin,
    Path(id): Path<Uuid>,
    AppJson(assignment): AppJson<RoleAssignment>,
) -> Result<AppJson<User>, AppError> {
    ensure_not_self(&admin, id)?;

    if assignment.access_roles.is_empty() {
        return Err(AppError::Validation("At least one access role is required".into()));
    }

    let mut user = load(&state, id)?;
    user.access_roles = assignment.access_roles;
    if let Some(cooperative_roles) = assignment.cooperative_roles {
        user.cooperative_roles = cooperative_roles;
    }
    user.updated_at = ledger::now();
    state
        .database
        .write(|transaction| users::update(transaction, &user))?;

    info!(user_id = %user.id, admin = %admin.email, roles = ?user.access_roles, "Roles assigned");

    Ok(AppJson(user))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Admin(admin): Admin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ensure_not_self(&admin, id)?;

    state
        .database
        .write(|transaction| users::delete(transaction, id))?;

    info!(user_id = %id, admin = %admin.email, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_disabled_handler(
    State(state): State<Arc<AppState>>,
    Admin(admin): Admin,
    Path(id): Path<Uuid>,
) -> Result<AppJson<User>, AppError> {
    ensure_not_self(&admin, id)?;

    let mut user = load(&state, id)?;
    user.disabled = !user.disabled;
    user.updated_at = ledger::now();
    state
        .database
        .write(|transaction| users::update(transaction, &user))?;

    info!(user_id = %user.id, disabled = user.disabled, admin = %admin.email, "User status toggled");

    Ok(AppJson(user))
}
