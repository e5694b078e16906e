use chrono::{DateTime, Utc};
use ledger::{Policy, PolicyChangeLog, PolicyKind, PolicyStatus, policy::Snapshot};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::{get_json, get_optional_json, get_parsed, get_uuid};
use crate::error::AppError;

fn document<P: Policy>(row: &Row<'_>) -> rusqlite::Result<P> {
    get_json(row, "document")
}

pub fn insert<P: Policy>(connection: &Connection, policy: &P) -> Result<(), AppError> {
    let header = policy.header();

    connection.execute(
        "INSERT INTO policies (policy_id, kind, version, status, effective_from, effective_to,
            created_by, document)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            header.policy_id.to_string(),
            P::KIND.as_str(),
            header.version,
            header.status.as_str(),
            header.effective_from,
            header.effective_to,
            header.created_by,
            serde_json::to_string(policy)?,
        ],
    )?;

    Ok(())
}

/// Replaces the stored document, provided nobody bumped the version meanwhile.
pub fn update<P: Policy>(
    connection: &Connection,
    policy: &P,
    expected_version: u32,
) -> Result<(), AppError> {
    let header = policy.header();

    let changed = connection.execute(
        "UPDATE policies SET version = ?3, status = ?4, effective_from = ?5, effective_to = ?6,
            document = ?7
         WHERE policy_id = ?1 AND kind = ?2 AND version = ?8",
        params![
            header.policy_id.to_string(),
            P::KIND.as_str(),
            header.version,
            header.status.as_str(),
            header.effective_from,
            header.effective_to,
            serde_json::to_string(policy)?,
            expected_version,
        ],
    )?;

    if changed == 0 {
        return Err(AppError::Conflict(format!(
            "Policy {} was modified concurrently",
            header.policy_id
        )));
    }

    Ok(())
}

pub fn find<P: Policy>(connection: &Connection, policy_id: Uuid) -> Result<Option<P>, AppError> {
    Ok(connection
        .query_row(
            "SELECT document FROM policies WHERE policy_id = ?1 AND kind = ?2",
            params![policy_id.to_string(), P::KIND.as_str()],
            document::<P>,
        )
        .optional()?)
}

/// Newest effective first.
pub fn list<P: Policy>(
    connection: &Connection,
    status: Option<PolicyStatus>,
) -> Result<Vec<P>, AppError> {
    let mut statement = connection.prepare(
        "SELECT document FROM policies
         WHERE kind = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY effective_from DESC, policy_id",
    )?;

    let policies = statement
        .query_map(
            params![P::KIND.as_str(), status.map(PolicyStatus::as_str)],
            document::<P>,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(policies)
}

pub fn active<P: Policy>(connection: &Connection) -> Result<Vec<P>, AppError> {
    list(connection, Some(PolicyStatus::Active))
}

/// Active policies whose window closed at or before `now`.
pub fn due_for_expiry(
    connection: &Connection,
    kind: PolicyKind,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, AppError> {
    let mut statement = connection.prepare(
        "SELECT policy_id FROM policies
         WHERE kind = ?1 AND status = 'active' AND effective_to IS NOT NULL AND effective_to <= ?2",
    )?;

    let ids = statement
        .query_map(params![kind.as_str(), now], |row| get_uuid(row, "policy_id"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(ids)
}

/// Every policy id with its kind, oldest first.
pub fn all_ids(connection: &Connection) -> Result<Vec<(PolicyKind, Uuid)>, AppError> {
    let mut statement =
        connection.prepare("SELECT kind, policy_id FROM policies ORDER BY effective_from, policy_id")?;

    let ids = statement
        .query_map([], |row| {
            Ok((get_parsed(row, "kind")?, get_uuid(row, "policy_id")?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(ids)
}

/// Stored document of any kind.
pub fn find_snapshot(
    connection: &Connection,
    policy_id: Uuid,
) -> Result<Option<(PolicyKind, Snapshot)>, AppError> {
    Ok(connection
        .query_row(
            "SELECT kind, document FROM policies WHERE policy_id = ?1",
            [policy_id.to_string()],
            |row| Ok((get_parsed(row, "kind")?, get_json(row, "document")?)),
        )
        .optional()?)
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<PolicyChangeLog> {
    Ok(PolicyChangeLog {
        id: get_uuid(row, "id")?,
        policy_id: get_uuid(row, "policy_id")?,
        policy_type: row.get("policy_type")?,
        change_type: get_parsed(row, "change_type")?,
        version_before: row.get("version_before")?,
        version_after: row.get("version_after")?,
        changes: get_json(row, "changes")?,
        snapshot_before: get_optional_json(row, "snapshot_before")?,
        snapshot_after: get_json(row, "snapshot_after")?,
        changed_by: row.get("changed_by")?,
        changed_reason: row.get("changed_reason")?,
        changed_at: row.get("changed_at")?,
        changed_from_ip: row.get("changed_from_ip")?,
        user_agent: row.get("user_agent")?,
    })
}

pub fn insert_log(connection: &Connection, log: &PolicyChangeLog) -> Result<(), AppError> {
    let snapshot_before = log
        .snapshot_before
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    connection.execute(
        "INSERT INTO policy_change_logs (id, policy_id, policy_type, change_type, version_before,
            version_after, changes, snapshot_before, snapshot_after, changed_by, changed_reason,
            changed_at, changed_from_ip, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            log.id.to_string(),
            log.policy_id.to_string(),
            log.policy_type,
            log.change_type.as_str(),
            log.version_before,
            log.version_after,
            serde_json::to_string(&log.changes)?,
            snapshot_before,
            serde_json::to_string(&log.snapshot_after)?,
            log.changed_by,
            log.changed_reason,
            log.changed_at,
            log.changed_from_ip,
            log.user_agent,
        ],
    )?;

    Ok(())
}

/// Change log of one policy, oldest first unless `newest_first`.
pub fn history(
    connection: &Connection,
    policy_id: Uuid,
    newest_first: bool,
) -> Result<Vec<PolicyChangeLog>, AppError> {
    let order = if newest_first { "DESC" } else { "ASC" };
    let mut statement = connection.prepare(&format!(
        "SELECT * FROM policy_change_logs WHERE policy_id = ?1 ORDER BY version_after {order}"
    ))?;

    let logs = statement
        .query_map([policy_id.to_string()], log_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(logs)
}
