//! Immutable change-log entries and history replay.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{
    Policy,
    diff::{Changes, Snapshot, classify, diff, snapshot},
};
use crate::error::{PolicyError, ReplayError};

text_enum! {
    pub enum ChangeType {
        Created => "created",
        Updated => "updated",
        Activated => "activated",
        Deactivated => "deactivated",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Where a change came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Who is changing a policy, when and why.
#[derive(Debug, Clone)]
pub struct ChangeContext<'a> {
    pub actor: &'a str,
    pub reason: Option<&'a str>,
    pub meta: &'a ClientMeta,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyChangeLog {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub policy_type: String,
    pub change_type: ChangeType,
    pub version_before: Option<u32>,
    pub version_after: u32,
    pub changes: Changes,
    pub snapshot_before: Option<Snapshot>,
    pub snapshot_after: Snapshot,
    pub changed_by: Option<String>,
    pub changed_reason: Option<String>,
    pub changed_at: DateTime<Utc>,
    pub changed_from_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl PolicyChangeLog {
    pub fn created<P: Policy>(policy: &P, context: &ChangeContext<'_>) -> Result<Self, PolicyError> {
        let after = snapshot(policy)?;

        Ok(Self::build::<P>(
            policy,
            ChangeType::Created,
            None,
            diff(None, &after),
            None,
            after,
            context,
        ))
    }

    pub fn changed<P: Policy>(
        before: &P,
        after: &P,
        context: &ChangeContext<'_>,
    ) -> Result<Self, PolicyError> {
        let snapshot_before = snapshot(before)?;
        let snapshot_after = snapshot(after)?;

        Ok(Self::build::<P>(
            after,
            classify(&snapshot_before, &snapshot_after),
            Some(before.version()),
            diff(Some(&snapshot_before), &snapshot_after),
            Some(snapshot_before),
            snapshot_after,
            context,
        ))
    }

    fn build<P: Policy>(
        policy: &P,
        change_type: ChangeType,
        version_before: Option<u32>,
        changes: Changes,
        snapshot_before: Option<Snapshot>,
        snapshot_after: Snapshot,
        context: &ChangeContext<'_>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy_id: policy.id(),
            policy_type: P::KIND.type_name().to_string(),
            change_type,
            version_before,
            version_after: policy.version(),
            changes,
            snapshot_before,
            snapshot_after,
            changed_by: Some(context.actor.to_string()),
            changed_reason: context.reason.map(str::to_string),
            changed_at: context.at,
            changed_from_ip: context.meta.ip.clone(),
            user_agent: context.meta.user_agent.clone(),
        }
    }
}

/// Rebuilds the latest snapshot from a history sorted by version.
pub fn replay(logs: &[PolicyChangeLog]) -> Result<Snapshot, ReplayError> {
    let (first, rest) = logs.split_first().ok_or(ReplayError::Empty)?;

    if first.change_type != ChangeType::Created
        || first.version_after != 1
        || first.version_before.is_some()
    {
        return Err(ReplayError::MissingCreated);
    }

    let mut state = first.snapshot_after.clone();
    let mut version = first.version_after;

    for log in rest {
        let expected = version + 1;
        if log.version_before != Some(version) || log.version_after != expected {
            return Err(ReplayError::VersionGap {
                expected,
                found: log.version_after,
            });
        }

        if log.snapshot_before.as_ref() != Some(&state) {
            return Err(ReplayError::SnapshotMismatch { version: expected });
        }

        for (field, change) in &log.changes {
            state.insert(field.clone(), change.new.clone());
        }
        state.insert(
            "updated_at".to_string(),
            Value::String(log.changed_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        version = expected;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::policy::{
        InterestPolicy, PolicyHeader, PolicyStatus, Transition, apply_patch, workflow,
    };

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn meta() -> ClientMeta {
        ClientMeta {
            ip: Some("10.0.0.7".into()),
            user_agent: Some("tests".into()),
        }
    }

    fn context<'a>(meta: &'a ClientMeta, at: DateTime<Utc>) -> ChangeContext<'a> {
        ChangeContext {
            actor: "moderator@yugantar.org",
            reason: Some("quarterly review"),
            meta,
            at,
        }
    }

    fn policy() -> InterestPolicy {
        InterestPolicy {
            header: PolicyHeader::draft("moderator@yugantar.org", start()),
            standard_interest_rate: Decimal::new(8, 0),
            penalty_interest_rate: Decimal::new(12, 0),
        }
    }

    /// Applies an edit the way the service does: bump, log, keep.
    fn revise(
        history: &mut Vec<PolicyChangeLog>,
        before: &InterestPolicy,
        mut after: InterestPolicy,
        at: DateTime<Utc>,
    ) -> InterestPolicy {
        let meta = meta();
        after.header.touch("moderator@yugantar.org", at);
        history.push(PolicyChangeLog::changed(before, &after, &context(&meta, at)).unwrap());
        after
    }

    #[test]
    fn test_created_log() {
        let meta = meta();
        let policy = policy();
        let log = PolicyChangeLog::created(&policy, &context(&meta, start())).unwrap();

        assert_eq!(log.change_type, ChangeType::Created);
        assert_eq!(log.version_before, None);
        assert_eq!(log.version_after, 1);
        assert_eq!(log.snapshot_before, None);
        assert_eq!(log.policy_type, "InterestPolicy");
        assert_eq!(log.changed_from_ip.as_deref(), Some("10.0.0.7"));
        assert!(log.changes.values().all(|change| change.old.is_null()));
    }

    #[test]
    fn test_changed_log_versions_are_consecutive() {
        let mut history = Vec::new();
        let v1 = policy();
        let patch = json!({ "standard_interest_rate": "9" });
        let edited = apply_patch(&v1, patch.as_object().unwrap()).unwrap();
        let v2 = revise(&mut history, &v1, edited, start() + Duration::minutes(5));

        let log = &history[0];
        assert_eq!(v2.header.version, 2);
        assert_eq!(log.version_before, Some(1));
        assert_eq!(log.version_after, 2);
        assert_eq!(log.change_type, ChangeType::Updated);
        assert_eq!(log.changes["standard_interest_rate"].new, json!("9"));
        assert_eq!(log.changes["version"].old, json!(1));
        assert!(!log.changes.contains_key("updated_at"));
    }

    #[test]
    fn test_replay_reconstructs_latest_snapshot() {
        let meta = meta();
        let v1 = policy();
        let mut history = vec![PolicyChangeLog::created(&v1, &context(&meta, start())).unwrap()];

        let patch = json!({ "penalty_interest_rate": "15.5" });
        let edited = apply_patch(&v1, patch.as_object().unwrap()).unwrap();
        let v2 = revise(&mut history, &v1, edited, start() + Duration::hours(1));

        let now = start() + Duration::hours(2);
        let submitted = workflow::apply(&v2, Transition::Submit, now).unwrap();
        let v3 = revise(&mut history, &v2, submitted, now);

        let now = start() + Duration::days(1);
        let approved = workflow::apply(&v3, Transition::Approve, now).unwrap();
        let v4 = revise(&mut history, &v3, approved, now);

        assert_eq!(history[3].change_type, ChangeType::Activated);
        assert_eq!(v4.header.status, PolicyStatus::Active);
        assert_eq!(replay(&history).unwrap(), snapshot(&v4).unwrap());
    }

    #[test]
    fn test_replay_rejects_broken_histories() {
        assert_eq!(replay(&[]), Err(ReplayError::Empty));

        let meta = meta();
        let v1 = policy();
        let created = PolicyChangeLog::created(&v1, &context(&meta, start())).unwrap();

        let mut history = Vec::new();
        let patch = json!({ "standard_interest_rate": "7" });
        let edited = apply_patch(&v1, patch.as_object().unwrap()).unwrap();
        let v2 = revise(&mut history, &v1, edited, start() + Duration::hours(1));
        assert_eq!(replay(&history), Err(ReplayError::MissingCreated));

        let edited = apply_patch(&v2, patch.as_object().unwrap()).unwrap();
        let mut skipped = edited.clone();
        skipped.header.version += 1;
        let mut gap = vec![created.clone()];
        revise(&mut gap, &v2, skipped, start() + Duration::hours(2));
        assert_eq!(
            replay(&gap),
            Err(ReplayError::VersionGap {
                expected: 2,
                found: 4
            })
        );

        let mut tampered = vec![created, history[0].clone()];
        if let Some(before) = tampered[1].snapshot_before.as_mut() {
            before.insert("standard_interest_rate".into(), json!("1"));
        }
        assert_eq!(
            replay(&tampered),
            Err(ReplayError::SnapshotMismatch { version: 2 })
        );
    }
}
