use ledger::Paisa;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use super::{get_optional_uuid, get_parsed, get_uuid};
use crate::{error::AppError, models::Fine};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Fine> {
    Ok(Fine {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        deposit_id: get_optional_uuid(row, "deposit_id")?,
        loan_id: get_optional_uuid(row, "loan_id")?,
        amount_paisa: Paisa(row.get("amount_paisa")?),
        fine_type: get_parsed(row, "fine_type")?,
        reason: row.get("reason")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(connection: &Connection, fine: &Fine) -> Result<(), AppError> {
    connection.execute(
        "INSERT INTO fines (id, user_id, deposit_id, loan_id, amount_paisa, fine_type, reason,
            created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            fine.id.to_string(),
            fine.user_id.to_string(),
            fine.deposit_id.map(|id| id.to_string()),
            fine.loan_id.map(|id| id.to_string()),
            fine.amount_paisa.0,
            fine.fine_type.as_str(),
            fine.reason,
            fine.created_at,
        ],
    )?;

    Ok(())
}

pub fn list_for_user(connection: &Connection, user_id: Uuid) -> Result<Vec<Fine>, AppError> {
    let mut statement = connection.prepare(
        "SELECT * FROM fines WHERE user_id = ?1 ORDER BY created_at DESC, id",
    )?;

    let fines = statement
        .query_map([user_id.to_string()], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(fines)
}
