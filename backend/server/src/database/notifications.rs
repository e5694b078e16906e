use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use super::{get_optional_uuid, get_parsed, get_uuid};
use crate::{error::AppError, models::Notification};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        title: row.get("title")?,
        message: row.get("message")?,
        notification_type: get_parsed(row, "notification_type")?,
        policy_id: get_optional_uuid(row, "policy_id")?,
        policy_type: row.get("policy_type")?,
        is_read: row.get("is_read")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(connection: &Connection, notification: &Notification) -> Result<(), AppError> {
    connection.execute(
        "INSERT INTO notifications (id, user_id, title, message, notification_type, policy_id,
            policy_type, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            notification.id.to_string(),
            notification.user_id.to_string(),
            notification.title,
            notification.message,
            notification.notification_type.as_str(),
            notification.policy_id.map(|id| id.to_string()),
            notification.policy_type,
            notification.is_read,
            notification.created_at,
        ],
    )?;

    Ok(())
}

/// Newest first.
pub fn list_for_user(
    connection: &Connection,
    user_id: Uuid,
    unread_only: bool,
) -> Result<Vec<Notification>, AppError> {
    let mut statement = connection.prepare(
        "SELECT * FROM notifications WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let notifications = statement
        .query_map(params![user_id.to_string(), unread_only], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(notifications)
}

pub fn unread_count(connection: &Connection, user_id: Uuid) -> Result<u32, AppError> {
    Ok(connection.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        [user_id.to_string()],
        |row| row.get(0),
    )?)
}

/// Only the owner can mark a notification read.
pub fn mark_read(connection: &Connection, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    let changed = connection.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
        [id.to_string(), user_id.to_string()],
    )?;

    if changed == 0 {
        return Err(AppError::NotFound("Notification"));
    }

    Ok(())
}

pub fn mark_all_read(connection: &Connection, user_id: Uuid) -> Result<usize, AppError> {
    Ok(connection.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        [user_id.to_string()],
    )?)
}
