use ledger::Paisa;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::{get_optional_uuid, get_parsed, get_uuid};
use crate::{
    error::AppError,
    models::{Loan, LoanPayment, LoanStatus},
};

const COLUMNS: &str = "id, user_id, policy_id, principal_paisa, interest_rate, grace_period_days,
    term_days, max_renewals, start_date, maturity_date, status, approved_by, total_paid_paisa,
    penalty_accrued_paisa, penalty_accrued_at, renewals, collateral, notes, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        policy_id: get_uuid(row, "policy_id")?,
        principal_paisa: Paisa(row.get("principal_paisa")?),
        interest_rate: get_parsed(row, "interest_rate")?,
        grace_period_days: row.get("grace_period_days")?,
        term_days: row.get("term_days")?,
        max_renewals: row.get("max_renewals")?,
        start_date: row.get("start_date")?,
        maturity_date: row.get("maturity_date")?,
        status: get_parsed(row, "status")?,
        approved_by: row.get("approved_by")?,
        total_paid_paisa: Paisa(row.get("total_paid_paisa")?),
        penalty_accrued_paisa: Paisa(row.get("penalty_accrued_paisa")?),
        penalty_accrued_at: row.get("penalty_accrued_at")?,
        renewals: row.get("renewals")?,
        collateral: row.get("collateral")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn insert(connection: &Connection, loan: &Loan) -> Result<(), AppError> {
    connection.execute(
        &format!(
            "INSERT INTO loans ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19,
                     ?20)"
        ),
        params![
            loan.id.to_string(),
            loan.user_id.to_string(),
            loan.policy_id.to_string(),
            loan.principal_paisa.0,
            loan.interest_rate.to_string(),
            loan.grace_period_days,
            loan.term_days,
            loan.max_renewals,
            loan.start_date,
            loan.maturity_date,
            loan.status.as_str(),
            loan.approved_by,
            loan.total_paid_paisa.0,
            loan.penalty_accrued_paisa.0,
            loan.penalty_accrued_at,
            loan.renewals,
            loan.collateral,
            loan.notes,
            loan.created_at,
            loan.updated_at,
        ],
    )?;

    Ok(())
}

pub fn update(connection: &Connection, loan: &Loan) -> Result<(), AppError> {
    let changed = connection.execute(
        "UPDATE loans SET start_date = ?2, maturity_date = ?3, status = ?4, approved_by = ?5,
            total_paid_paisa = ?6, penalty_accrued_paisa = ?7, penalty_accrued_at = ?8,
            renewals = ?9, notes = ?10, updated_at = ?11
         WHERE id = ?1",
        params![
            loan.id.to_string(),
            loan.start_date,
            loan.maturity_date,
            loan.status.as_str(),
            loan.approved_by,
            loan.total_paid_paisa.0,
            loan.penalty_accrued_paisa.0,
            loan.penalty_accrued_at,
            loan.renewals,
            loan.notes,
            loan.updated_at,
        ],
    )?;

    if changed == 0 {
        return Err(AppError::NotFound("Loan"));
    }

    Ok(())
}

pub fn find(connection: &Connection, id: Uuid) -> Result<Option<Loan>, AppError> {
    Ok(connection
        .query_row(
            &format!("SELECT {COLUMNS} FROM loans WHERE id = ?1"),
            [id.to_string()],
            from_row,
        )
        .optional()?)
}

pub fn list(
    connection: &Connection,
    user_id: Option<Uuid>,
    status: Option<LoanStatus>,
) -> Result<Vec<Loan>, AppError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {COLUMNS} FROM loans
         WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at DESC, id"
    ))?;

    let loans = statement
        .query_map(
            params![
                user_id.map(|id| id.to_string()),
                status.map(LoanStatus::as_str)
            ],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(loans)
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<LoanPayment> {
    Ok(LoanPayment {
        id: get_uuid(row, "id")?,
        loan_id: get_uuid(row, "loan_id")?,
        receipt_id: get_optional_uuid(row, "receipt_id")?,
        amount_paisa: Paisa(row.get("amount_paisa")?),
        principal_paisa: Paisa(row.get("principal_paisa")?),
        interest_paisa: Paisa(row.get("interest_paisa")?),
        penalty_paisa: Paisa(row.get("penalty_paisa")?),
        recorded_by: row.get("recorded_by")?,
        paid_at: row.get("paid_at")?,
    })
}

pub fn insert_payment(connection: &Connection, payment: &LoanPayment) -> Result<(), AppError> {
    connection.execute(
        "INSERT INTO loan_payments (id, loan_id, receipt_id, amount_paisa, principal_paisa,
            interest_paisa, penalty_paisa, recorded_by, paid_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            payment.id.to_string(),
            payment.loan_id.to_string(),
            payment.receipt_id.map(|id| id.to_string()),
            payment.amount_paisa.0,
            payment.principal_paisa.0,
            payment.interest_paisa.0,
            payment.penalty_paisa.0,
            payment.recorded_by,
            payment.paid_at,
        ],
    )?;

    Ok(())
}

/// Oldest first.
pub fn list_payments(connection: &Connection, loan_id: Uuid) -> Result<Vec<LoanPayment>, AppError> {
    let mut statement = connection
        .prepare("SELECT * FROM loan_payments WHERE loan_id = ?1 ORDER BY paid_at, rowid")?;

    let payments = statement
        .query_map([loan_id.to_string()], payment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(payments)
}

/// Penalty and interest already settled on a loan.
pub fn settled(connection: &Connection, loan_id: Uuid) -> Result<(Paisa, Paisa), AppError> {
    let (penalty, interest) = connection.query_row(
        "SELECT COALESCE(SUM(penalty_paisa), 0), COALESCE(SUM(interest_paisa), 0)
         FROM loan_payments WHERE loan_id = ?1",
        [loan_id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok((Paisa(penalty), Paisa(interest)))
}
