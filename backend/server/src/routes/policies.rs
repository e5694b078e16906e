//! One router per policy kind, all built from the same generic handlers and
//! nested under `/api/v1/policies/{kind}`.
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use ledger::{
    Policy, PolicyChangeLog, PolicyStatus,
    policy::{
        DepositPolicy, InterestPolicy, InvestmentPolicy, LoanPolicy, PenaltyPolicy, Snapshot,
    },
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    guards::{ActiveUser, Admin, Moderator},
    services::policy::ReplayReport,
    state::State as AppState,
    utils::{AppJson, RequestMeta, require_reason},
};

#[derive(Deserialize)]
pub struct StatusFilter {
    #[serde(default)]
    status: Option<PolicyStatus>,
}

/// Policy fields plus the optional reason recorded on the change log.
#[derive(Deserialize)]
pub struct PolicyBody {
    #[serde(default)]
    change_reason: Option<String>,
    #[serde(flatten)]
    fields: Snapshot,
}

#[derive(Deserialize)]
pub struct ReasonBody {
    #[serde(default)]
    change_reason: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/deposit", policy_routes::<DepositPolicy>())
        .nest("/loan", policy_routes::<LoanPolicy>())
        .nest("/interest", policy_routes::<InterestPolicy>())
        .nest("/investment", policy_routes::<InvestmentPolicy>())
        .nest("/penalty", policy_routes::<PenaltyPolicy>())
}

fn policy_routes<P: Policy>() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler::<P>).post(create_handler::<P>))
        .route("/active", get(active_handler::<P>))
        .route(
            "/{id}",
            get(get_handler::<P>)
                .put(update_handler::<P>)
                .delete(deactivate_handler::<P>),
        )
        .route("/{id}/submit", post(submit_handler::<P>))
        .route("/{id}/approve", post(approve_handler::<P>))
        .route("/{id}/reject", post(reject_handler::<P>))
        .route("/{id}/history", get(history_handler::<P>))
        .route("/{id}/replay", get(replay_handler::<P>))
}

async fn list_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    _: ActiveUser,
    Query(filter): Query<StatusFilter>,
) -> Result<AppJson<Vec<P>>, AppError> {
    Ok(AppJson(state.policies.list::<P>(filter.status)?))
}

async fn active_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    _: ActiveUser,
) -> Result<AppJson<P>, AppError> {
    state
        .policies
        .active::<P>()?
        .map(AppJson)
        .ok_or(AppError::NotFound("Active policy"))
}

async fn get_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    _: ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<AppJson<P>, AppError> {
    Ok(AppJson(state.policies.get::<P>(id)?))
}

async fn create_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    Moderator(user): Moderator,
    RequestMeta(meta): RequestMeta,
    AppJson(body): AppJson<PolicyBody>,
) -> Result<impl IntoResponse, AppError> {
    let reason = body
        .change_reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty());
    let policy = state
        .policies
        .create::<P>(&body.fields, &user.email, reason, &meta)?;

    Ok((StatusCode::CREATED, AppJson(policy)))
}

async fn update_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    Moderator(user): Moderator,
    RequestMeta(meta): RequestMeta,
    Path(id): Path<Uuid>,
    AppJson(body): AppJson<PolicyBody>,
) -> Result<AppJson<P>, AppError> {
    let reason = require_reason(body.change_reason.as_deref())?;

    Ok(AppJson(state.policies.update::<P>(
        id,
        &body.fields,
        &user.email,
        reason,
        &meta,
    )?))
}

async fn deactivate_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    Moderator(user): Moderator,
    RequestMeta(meta): RequestMeta,
    Path(id): Path<Uuid>,
    AppJson(body): AppJson<ReasonBody>,
) -> Result<AppJson<P>, AppError> {
    let reason = require_reason(body.change_reason.as_deref())?;

    Ok(AppJson(
        state.policies.deactivate::<P>(id, &user.email, reason, &meta)?,
    ))
}

async fn submit_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    Moderator(user): Moderator,
    RequestMeta(meta): RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<AppJson<P>, AppError> {
    Ok(AppJson(state.policies.submit::<P>(id, &user.email, &meta)?))
}

async fn approve_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    Admin(user): Admin,
    RequestMeta(meta): RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<AppJson<P>, AppError> {
    Ok(AppJson(state.policies.approve::<P>(id, &user.email, &meta)?))
}

async fn reject_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    Admin(user): Admin,
    RequestMeta(meta): RequestMeta,
    Path(id): Path<Uuid>,
    AppJson(body): AppJson<ReasonBody>,
) -> Result<AppJson<P>, AppError> {
    let reason = require_reason(body.change_reason.as_deref())?;

    Ok(AppJson(
        state.policies.reject::<P>(id, &user.email, reason, &meta)?,
    ))
}

/// Staff only. Rows include the client IP and user agent.
async fn history_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    _: Moderator,
    Path(id): Path<Uuid>,
) -> Result<AppJson<Vec<PolicyChangeLog>>, AppError> {
    Ok(AppJson(state.policies.history::<P>(id)?))
}

async fn replay_handler<P: Policy>(
    State(state): State<Arc<AppState>>,
    _: Moderator,
    Path(id): Path<Uuid>,
) -> Result<AppJson<ReplayReport>, AppError> {
    // Scopes the lookup to the kind in the path.
    state.policies.get::<P>(id)?;

    Ok(AppJson(state.policies.replay(id)?))
}
