//! Snapshots and field level diffs.
//!
//! A snapshot is the policy serialized to a JSON object. Diffs, classification
//! and patches all work on snapshots so they stay generic over the policy kind.
use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use serde_json::{Map, Value};

use super::{
    ChangeType, EDITABLE_HEADER_FIELDS, FieldChange, HEADER_FIELDS, Policy, PolicyHeader,
    PolicyStatus,
};
use crate::error::PolicyError;

pub type Snapshot = Map<String, Value>;

pub type Changes = BTreeMap<String, FieldChange>;

/// Identity and bookkeeping fields never reported as changes.
pub const SKIPPED_FIELDS: [&str; 3] = ["policy_id", "created_at", "updated_at"];

pub fn snapshot<P: Policy>(policy: &P) -> Result<Snapshot, PolicyError> {
    match serde_json::to_value(policy) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PolicyError::Document("policy is not a JSON object".into())),
        Err(e) => Err(PolicyError::Document(e.to_string())),
    }
}

pub fn from_snapshot<P: Policy>(snapshot: Snapshot) -> Result<P, PolicyError> {
    serde_json::from_value(Value::Object(snapshot)).map_err(|e| PolicyError::Invalid(e.to_string()))
}

pub fn diff(before: Option<&Snapshot>, after: &Snapshot) -> Changes {
    let Some(before) = before else {
        return after
            .iter()
            .map(|(field, value)| {
                (
                    field.clone(),
                    FieldChange {
                        old: Value::Null,
                        new: value.clone(),
                    },
                )
            })
            .collect();
    };

    let fields: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    let mut changes = Changes::new();

    for field in fields {
        if SKIPPED_FIELDS.contains(&field.as_str()) {
            continue;
        }

        let old = before.get(field).unwrap_or(&Value::Null);
        let new = after.get(field).unwrap_or(&Value::Null);

        if !same_value(old, new) {
            changes.insert(
                field.clone(),
                FieldChange {
                    old: old.clone(),
                    new: new.clone(),
                },
            );
        }
    }

    changes
}

fn same_value(old: &Value, new: &Value) -> bool {
    match (as_timestamp(old), as_timestamp(new)) {
        (Some(old), Some(new)) => old == new,
        _ => old == new,
    }
}

/// Whole seconds of an RFC 3339 string.
fn as_timestamp(value: &Value) -> Option<i64> {
    value
        .as_str()
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|at| at.timestamp())
}

fn status_of(snapshot: &Snapshot) -> Option<PolicyStatus> {
    snapshot.get("status")?.as_str()?.parse().ok()
}

fn is_active(snapshot: &Snapshot) -> bool {
    snapshot.get("is_active").and_then(Value::as_bool).unwrap_or(false)
}

pub fn classify(before: &Snapshot, after: &Snapshot) -> ChangeType {
    let old_status = status_of(before);
    let new_status = status_of(after);
    let status_moved = old_status != new_status;

    if (is_active(before) && !is_active(after))
        || (status_moved && new_status.is_some_and(PolicyStatus::is_terminal))
    {
        ChangeType::Deactivated
    } else if status_moved && new_status == Some(PolicyStatus::Active) {
        ChangeType::Activated
    } else {
        ChangeType::Updated
    }
}

fn check_writable(field: &str) -> Result<(), PolicyError> {
    if HEADER_FIELDS.contains(&field) && !EDITABLE_HEADER_FIELDS.contains(&field) {
        return Err(PolicyError::ReadOnlyField(field.to_string()));
    }

    Ok(())
}

/// Builds a new draft from client supplied fields and a fresh header.
pub fn from_draft<P: Policy>(fields: &Snapshot, header: PolicyHeader) -> Result<P, PolicyError> {
    let mut document = match serde_json::to_value(&header) {
        Ok(Value::Object(map)) => map,
        _ => return Err(PolicyError::Document("header is not a JSON object".into())),
    };

    for (field, value) in fields {
        check_writable(field)?;

        if field == "effective_from" && value.is_null() {
            continue;
        }

        document.insert(field.clone(), value.clone());
    }

    let mut policy: P = from_snapshot(document)?;
    policy.header_mut().truncate_timestamps();

    let known = snapshot(&policy)?;
    if let Some(field) = fields.keys().find(|field| !known.contains_key(*field)) {
        return Err(PolicyError::UnknownField(field.clone()));
    }

    policy.check()?;

    Ok(policy)
}

/// Merges `patch` onto the policy and re-validates the result.
pub fn apply_patch<P: Policy>(policy: &P, patch: &Snapshot) -> Result<P, PolicyError> {
    let mut document = snapshot(policy)?;

    for (field, value) in patch {
        check_writable(field)?;

        if !document.contains_key(field) {
            return Err(PolicyError::UnknownField(field.clone()));
        }

        document.insert(field.clone(), value.clone());
    }

    let mut updated: P = from_snapshot(document)?;
    updated.header_mut().truncate_timestamps();
    updated.check()?;

    Ok(updated)
}
