use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use ledger::{Paisa, money::rupees_to_paisa};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    database::receipts,
    error::AppError,
    guards::ActiveUser,
    models::Receipt,
    ocr::JobStatus,
    state::State as AppState,
    utils::AppJson,
};

#[derive(Deserialize)]
pub struct NewReceipt {
    amount_paisa: Paisa,
    #[serde(default)]
    charge_paisa: Option<Paisa>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    deposit_id: Option<Uuid>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Deserialize)]
pub struct FromJob {
    #[serde(default)]
    deposit_id: Option<Uuid>,
    #[serde(default)]
    notes: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler).post(create_handler))
        .route("/from-job/{job_id}", post(from_job_handler))
        .route("/{id}", get(get_handler).delete(delete_handler))
}

fn store(state: &AppState, receipt: Receipt) -> Result<(StatusCode, AppJson<Receipt>), AppError> {
    if !receipt.amount_paisa.is_positive() {
        return Err(AppError::Validation("Receipt amount must be positive".into()));
    }

    state
        .database
        .write(|transaction| receipts::insert(transaction, &receipt))?;

    Ok((StatusCode::CREATED, AppJson(receipt)))
}

async fn create_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    AppJson(new): AppJson<NewReceipt>,
) -> Result<impl IntoResponse, AppError> {
    store(
        &state,
        Receipt {
            id: Uuid::new_v4(),
            user_id: user.id,
            deposit_id: new.deposit_id,
            amount_paisa: new.amount_paisa,
            charge_paisa: new.charge_paisa,
            reference: new.reference,
            paid_at: new.paid_at,
            notes: new.notes,
            created_at: ledger::now(),
        },
    )
}

/// Stores the details extracted by a completed OCR job.
async fn from_job_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(job_id): Path<Uuid>,
    AppJson(body): AppJson<FromJob>,
) -> Result<impl IntoResponse, AppError> {
    let JobStatus::Completed { result } = state.ocr_jobs.status(user.id, job_id)? else {
        return Err(AppError::BadRequest("OCR job has not completed".into()));
    };

    let amount_paisa = result
        .amount
        .and_then(rupees_to_paisa)
        .ok_or_else(|| AppError::BadRequest("No amount was found on the receipt".into()))?;

    store(
        &state,
        Receipt {
            id: Uuid::new_v4(),
            user_id: user.id,
            deposit_id: body.deposit_id,
            amount_paisa,
            charge_paisa: result.charge.and_then(rupees_to_paisa),
            reference: result.reference,
            paid_at: result.date,
            notes: body.notes,
            created_at: ledger::now(),
        },
    )
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
) -> Result<AppJson<Vec<Receipt>>, AppError> {
    Ok(AppJson(state.database.read(|connection| {
        receipts::list_for_user(connection, user.id)
    })?))
}

async fn get_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<AppJson<Receipt>, AppError> {
    state
        .database
        .read(|connection| receipts::find(connection, id))?
        .filter(|receipt| receipt.user_id == user.id)
        .map(AppJson)
        .ok_or(AppError::NotFound("Receipt"))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.database.write(|transaction| {
        receipts::find(transaction, id)?
            .filter(|receipt| receipt.user_id == user.id)
            .ok_or(AppError::NotFound("Receipt"))?;
        receipts::delete(transaction, id)
    })?;

    Ok(StatusCode::NO_CONTENT)
}
