use ledger::Paisa;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::{get_optional_uuid, get_uuid};
use crate::{error::AppError, models::Receipt};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Receipt> {
    Ok(Receipt {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        deposit_id: get_optional_uuid(row, "deposit_id")?,
        amount_paisa: Paisa(row.get("amount_paisa")?),
        charge_paisa: row.get::<_, Option<i64>>("charge_paisa")?.map(Paisa),
        reference: row.get("reference")?,
        paid_at: row.get("paid_at")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(connection: &Connection, receipt: &Receipt) -> Result<(), AppError> {
    connection.execute(
        "INSERT INTO receipts (id, user_id, deposit_id, amount_paisa, charge_paisa, reference,
            paid_at, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            receipt.id.to_string(),
            receipt.user_id.to_string(),
            receipt.deposit_id.map(|id| id.to_string()),
            receipt.amount_paisa.0,
            receipt.charge_paisa.map(|charge| charge.0),
            receipt.reference,
            receipt.paid_at,
            receipt.notes,
            receipt.created_at,
        ],
    )?;

    Ok(())
}

pub fn find(connection: &Connection, id: Uuid) -> Result<Option<Receipt>, AppError> {
    Ok(connection
        .query_row("SELECT * FROM receipts WHERE id = ?1", [id.to_string()], from_row)
        .optional()?)
}

pub fn list_for_user(connection: &Connection, user_id: Uuid) -> Result<Vec<Receipt>, AppError> {
    let mut statement =
        connection.prepare("SELECT * FROM receipts WHERE user_id = ?1 ORDER BY created_at DESC, id")?;

    let receipts = statement
        .query_map([user_id.to_string()], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(receipts)
}

pub fn delete(connection: &Connection, id: Uuid) -> Result<(), AppError> {
    if connection.execute("DELETE FROM receipts WHERE id = ?1", [id.to_string()])? == 0 {
        return Err(AppError::NotFound("Receipt"));
    }

    Ok(())
}
