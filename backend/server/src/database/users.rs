use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::{get_json, get_uuid};
use crate::{
    error::AppError,
    models::{AccessRole, User},
};

const COLUMNS: &str = "id, first_name, middle_name, last_name, email, phone, address, password_hash,
    access_roles, cooperative_roles, disabled, is_verified, joined_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: get_uuid(row, "id")?,
        first_name: row.get("first_name")?,
        middle_name: row.get("middle_name")?,
        last_name: row.get("last_name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        address: row.get("address")?,
        password_hash: row.get("password_hash")?,
        access_roles: get_json(row, "access_roles")?,
        cooperative_roles: get_json(row, "cooperative_roles")?,
        disabled: row.get("disabled")?,
        is_verified: row.get("is_verified")?,
        joined_at: row.get("joined_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn insert(connection: &Connection, user: &User) -> Result<(), AppError> {
    connection.execute(
        &format!(
            "INSERT INTO users ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            user.id.to_string(),
            user.first_name,
            user.middle_name,
            user.last_name,
            user.email,
            user.phone,
            user.address,
            user.password_hash,
            serde_json::to_string(&user.access_roles)?,
            serde_json::to_string(&user.cooperative_roles)?,
            user.disabled,
            user.is_verified,
            user.joined_at,
            user.updated_at,
        ],
    )?;

    Ok(())
}

/// Writes every mutable column back.
pub fn update(connection: &Connection, user: &User) -> Result<(), AppError> {
    let changed = connection.execute(
        "UPDATE users SET first_name = ?2, middle_name = ?3, last_name = ?4, phone = ?5,
            address = ?6, password_hash = ?7, access_roles = ?8, cooperative_roles = ?9,
            disabled = ?10, is_verified = ?11, updated_at = ?12
         WHERE id = ?1",
        params![
            user.id.to_string(),
            user.first_name,
            user.middle_name,
            user.last_name,
            user.phone,
            user.address,
            user.password_hash,
            serde_json::to_string(&user.access_roles)?,
            serde_json::to_string(&user.cooperative_roles)?,
            user.disabled,
            user.is_verified,
            user.updated_at,
        ],
    )?;

    if changed == 0 {
        return Err(AppError::NotFound("User"));
    }

    Ok(())
}

pub fn find_by_id(connection: &Connection, id: Uuid) -> Result<Option<User>, AppError> {
    Ok(connection
        .query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
            [id.to_string()],
            from_row,
        )
        .optional()?)
}

pub fn find_by_email(connection: &Connection, email: &str) -> Result<Option<User>, AppError> {
    Ok(connection
        .query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
            [email],
            from_row,
        )
        .optional()?)
}

pub fn list(connection: &Connection, skip: u32, limit: u32) -> Result<Vec<User>, AppError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {COLUMNS} FROM users ORDER BY joined_at, email LIMIT ?1 OFFSET ?2"
    ))?;

    let users = statement
        .query_map(params![limit, skip], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(users)
}

pub fn ids_with_role(connection: &Connection, role: AccessRole) -> Result<Vec<Uuid>, AppError> {
    let mut statement = connection.prepare(
        "SELECT users.id FROM users, json_each(users.access_roles)
         WHERE json_each.value = ?1 AND users.disabled = 0",
    )?;

    let ids = statement
        .query_map([role.as_str()], |row| get_uuid(row, "id"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(ids)
}

pub fn delete(connection: &Connection, id: Uuid) -> Result<(), AppError> {
    if connection.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])? == 0 {
        return Err(AppError::NotFound("User"));
    }

    Ok(())
}
