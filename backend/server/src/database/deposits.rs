use ledger::Paisa;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::{get_optional_uuid, get_parsed, get_uuid};
use crate::{error::AppError, models::Deposit};

const COLUMNS: &str = "id, user_id, policy_id, amount_paisa, amount_due_paisa, deposited_at, due_at,
    timing, verification, verified_by, receipt_id, notes, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Deposit> {
    Ok(Deposit {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        policy_id: get_uuid(row, "policy_id")?,
        amount_paisa: Paisa(row.get("amount_paisa")?),
        amount_due_paisa: Paisa(row.get("amount_due_paisa")?),
        deposited_at: row.get("deposited_at")?,
        due_at: row.get("due_at")?,
        timing: get_parsed(row, "timing")?,
        verification: get_parsed(row, "verification")?,
        verified_by: row.get("verified_by")?,
        receipt_id: get_optional_uuid(row, "receipt_id")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn insert(connection: &Connection, deposit: &Deposit) -> Result<(), AppError> {
    connection.execute(
        &format!(
            "INSERT INTO deposits ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            deposit.id.to_string(),
            deposit.user_id.to_string(),
            deposit.policy_id.to_string(),
            deposit.amount_paisa.0,
            deposit.amount_due_paisa.0,
            deposit.deposited_at,
            deposit.due_at,
            deposit.timing.as_str(),
            deposit.verification.as_str(),
            deposit.verified_by,
            deposit.receipt_id.map(|id| id.to_string()),
            deposit.notes,
            deposit.created_at,
            deposit.updated_at,
        ],
    )?;

    Ok(())
}

pub fn update(connection: &Connection, deposit: &Deposit) -> Result<(), AppError> {
    let changed = connection.execute(
        "UPDATE deposits SET amount_paisa = ?2, deposited_at = ?3, timing = ?4, verification = ?5,
            verified_by = ?6, receipt_id = ?7, notes = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            deposit.id.to_string(),
            deposit.amount_paisa.0,
            deposit.deposited_at,
            deposit.timing.as_str(),
            deposit.verification.as_str(),
            deposit.verified_by,
            deposit.receipt_id.map(|id| id.to_string()),
            deposit.notes,
            deposit.updated_at,
        ],
    )?;

    if changed == 0 {
        return Err(AppError::NotFound("Deposit"));
    }

    Ok(())
}

pub fn find(connection: &Connection, id: Uuid) -> Result<Option<Deposit>, AppError> {
    Ok(connection
        .query_row(
            &format!("SELECT {COLUMNS} FROM deposits WHERE id = ?1"),
            [id.to_string()],
            from_row,
        )
        .optional()?)
}

/// Deposits of one user, latest due date first.
pub fn list_for_user(connection: &Connection, user_id: Uuid) -> Result<Vec<Deposit>, AppError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {COLUMNS} FROM deposits WHERE user_id = ?1 ORDER BY due_at DESC, created_at DESC"
    ))?;

    let deposits = statement
        .query_map([user_id.to_string()], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(deposits)
}

pub fn list_pending(connection: &Connection) -> Result<Vec<Deposit>, AppError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {COLUMNS} FROM deposits WHERE verification = 'pending' ORDER BY created_at"
    ))?;

    let deposits = statement
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(deposits)
}

/// Latest deposit of the user that still counts toward the schedule.
pub fn last_counted(connection: &Connection, user_id: Uuid) -> Result<Option<Deposit>, AppError> {
    Ok(connection
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM deposits WHERE user_id = ?1 AND verification != 'rejected'
                 ORDER BY due_at DESC LIMIT 1"
            ),
            [user_id.to_string()],
            from_row,
        )
        .optional()?)
}

pub fn count_for_policy(
    connection: &Connection,
    user_id: Uuid,
    policy_id: Uuid,
) -> Result<u32, AppError> {
    Ok(connection.query_row(
        "SELECT COUNT(*) FROM deposits WHERE user_id = ?1 AND policy_id = ?2
            AND verification != 'rejected'",
        [user_id.to_string(), policy_id.to_string()],
        |row| row.get(0),
    )?)
}

pub fn delete(connection: &Connection, id: Uuid) -> Result<(), AppError> {
    if connection.execute("DELETE FROM deposits WHERE id = ?1", [id.to_string()])? == 0 {
        return Err(AppError::NotFound("Deposit"));
    }

    Ok(())
}
