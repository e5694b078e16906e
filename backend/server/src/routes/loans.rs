use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use ledger::{Paisa, loan::LoanStatement};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    database::loans,
    error::AppError,
    guards::{ActiveUser, Moderator},
    models::{Loan, LoanPayment, LoanStatus, User},
    services::loans::{
        LoanApplication, PaymentReceipt, apply, approve, find, loan_statement, payments,
        record_payment, reject, renew,
    },
    state::State as AppState,
    utils::AppJson,
};

#[derive(Deserialize)]
pub struct LoanFilter {
    #[serde(default)]
    user_id: Option<Uuid>,
    #[serde(default)]
    status: Option<LoanStatus>,
}

#[derive(Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
pub struct PaymentBody {
    amount_paisa: Paisa,
    #[serde(default)]
    receipt_id: Option<Uuid>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler).post(apply_handler))
        .route("/all", get(all_handler))
        .route("/{id}", get(get_handler))
        .route("/{id}/statement", get(statement_handler))
        .route("/{id}/approve", post(approve_handler))
        .route("/{id}/reject", post(reject_handler))
        .route("/{id}/payments", get(payments_handler).post(payment_handler))
        .route("/{id}/renew", post(renew_handler))
}

fn visible_loan(state: &AppState, user: &User, id: Uuid) -> Result<Loan, AppError> {
    Some(find(&state.database, id)?)
        .filter(|loan| loan.user_id == user.id || user.is_staff())
        .ok_or(AppError::NotFound("Loan"))
}

async fn apply_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    AppJson(application): AppJson<LoanApplication>,
) -> Result<impl IntoResponse, AppError> {
    let loan = apply(&state.database, user.id, application)?;

    Ok((StatusCode::CREATED, AppJson(loan)))
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
) -> Result<AppJson<Vec<Loan>>, AppError> {
    Ok(AppJson(state.database.read(|connection| {
        loans::list(connection, Some(user.id), None)
    })?))
}

async fn all_handler(
    State(state): State<Arc<AppState>>,
    _: Moderator,
    Query(filter): Query<LoanFilter>,
) -> Result<AppJson<Vec<Loan>>, AppError> {
    Ok(AppJson(state.database.read(|connection| {
        loans::list(connection, filter.user_id, filter.status)
    })?))
}

async fn get_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<AppJson<Loan>, AppError> {
    Ok(AppJson(visible_loan(&state, &user, id)?))
}

async fn statement_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<AppJson<LoanStatement>, AppError> {
    let loan = visible_loan(&state, &user, id)?;

    Ok(AppJson(loan_statement(&state.database, &loan, ledger::now())?))
}

async fn approve_handler(
    State(state): State<Arc<AppState>>,
    Moderator(moderator): Moderator,
    Path(id): Path<Uuid>,
) -> Result<AppJson<Loan>, AppError> {
    Ok(AppJson(approve(&state.database, &moderator.email, id)?))
}

async fn reject_handler(
    State(state): State<Arc<AppState>>,
    Moderator(moderator): Moderator,
    Path(id): Path<Uuid>,
    AppJson(body): AppJson<RejectBody>,
) -> Result<AppJson<Loan>, AppError> {
    Ok(AppJson(reject(
        &state.database,
        &moderator.email,
        id,
        body.reason.as_deref(),
    )?))
}

async fn payments_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<AppJson<Vec<LoanPayment>>, AppError> {
    let loan = visible_loan(&state, &user, id)?;

    Ok(AppJson(payments(&state.database, loan.id)?))
}

async fn payment_handler(
    State(state): State<Arc<AppState>>,
    Moderator(moderator): Moderator,
    Path(id): Path<Uuid>,
    AppJson(body): AppJson<PaymentBody>,
) -> Result<AppJson<PaymentReceipt>, AppError> {
    Ok(AppJson(record_payment(
        &state.database,
        &moderator.email,
        id,
        body.amount_paisa,
        body.receipt_id,
        ledger::now(),
    )?))
}

async fn renew_handler(
    State(state): State<Arc<AppState>>,
    _: Moderator,
    Path(id): Path<Uuid>,
) -> Result<AppJson<Loan>, AppError> {
    Ok(AppJson(renew(&state.database, id)?))
}
