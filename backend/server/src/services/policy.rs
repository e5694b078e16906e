//! # Policy service
//!
//! Generic over the policy kind. Every mutation is one SQLite transaction that
//! writes the policy row, exactly one change-log row and whatever notifications
//! the change triggers. If any of those fail nothing is written.
//!
//! Approving a policy expires any other active policy of the same kind in the
//! same transaction, each with its own `deactivated` log entry.
use chrono::{DateTime, SubsecRound, Utc};
use ledger::{
    ClientMeta, Policy, PolicyChangeLog, PolicyError, PolicyHeader, PolicyKind,
    PolicyStatus,
    policy::{
        ChangeContext, DepositPolicy, InterestPolicy, InvestmentPolicy, LoanPolicy,
        PenaltyPolicy, Snapshot, Transition, apply_patch, from_draft, replay, workflow,
    },
};
use rusqlite::Transaction;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    database::{Database, notifications, policies, users},
    error::AppError,
    models::{AccessRole, Notification, NotificationType},
};

/// Actor recorded for changes made by background tasks.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub policy_id: Uuid,
    pub kind: PolicyKind,
    pub stored_version: Option<u64>,
    pub matches: bool,
    pub replayed: Option<Snapshot>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct PolicyService {
    database: Database,
}

/// Bumps the version, logs and stores one change of an existing policy.
fn record<P: Policy>(
    transaction: &Transaction<'_>,
    before: &P,
    mut after: P,
    context: &ChangeContext<'_>,
) -> Result<P, AppError> {
    after.header_mut().touch(context.actor, context.at);
    after.check()?;

    let log = PolicyChangeLog::changed(before, &after, context)?;
    policies::update(transaction, &after, before.version())?;
    policies::insert_log(transaction, &log)?;

    info!(
        policy_id = %after.id(),
        kind = %P::KIND,
        version = after.version(),
        change = %log.change_type,
        actor = context.actor,
        "Policy changed"
    );

    Ok(after)
}

fn load<P: Policy>(transaction: &Transaction<'_>, policy_id: Uuid) -> Result<P, AppError> {
    policies::find::<P>(transaction, policy_id)?.ok_or(AppError::NotFound("Policy"))
}

fn notify_creator<P: Policy>(
    transaction: &Transaction<'_>,
    policy: &P,
    notification_type: NotificationType,
    title: &str,
    message: String,
) -> Result<(), AppError> {
    let Some(creator) = policy.header().created_by.as_deref() else {
        return Ok(());
    };

    match users::find_by_email(transaction, creator)? {
        Some(user) => notifications::insert(
            transaction,
            &Notification::new(user.id, notification_type, title, message)
                .about_policy(policy.id(), P::KIND.type_name()),
        ),
        None => {
            warn!(policy_id = %policy.id(), creator, "Policy creator no longer exists");
            Ok(())
        }
    }
}

impl PolicyService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Applies `change` to the stored policy and records it, then runs `after`
    /// inside the same transaction.
    fn mutate<P: Policy>(
        &self,
        policy_id: Uuid,
        actor: &str,
        reason: Option<&str>,
        meta: &ClientMeta,
        change: impl FnOnce(&P, DateTime<Utc>) -> Result<P, PolicyError>,
        after: impl FnOnce(&Transaction<'_>, &P, &ChangeContext<'_>) -> Result<(), AppError>,
    ) -> Result<P, AppError> {
        self.mutate_at(policy_id, actor, reason, meta, ledger::now(), change, after)
    }

    /// Like [`PolicyService::mutate`] with the change stamped at `at`.
    #[allow(clippy::too_many_arguments)]
    fn mutate_at<P: Policy>(
        &self,
        policy_id: Uuid,
        actor: &str,
        reason: Option<&str>,
        meta: &ClientMeta,
        at: DateTime<Utc>,
        change: impl FnOnce(&P, DateTime<Utc>) -> Result<P, PolicyError>,
        after: impl FnOnce(&Transaction<'_>, &P, &ChangeContext<'_>) -> Result<(), AppError>,
    ) -> Result<P, AppError> {
        let context = ChangeContext {
            actor,
            reason,
            meta,
            at: at.trunc_subsecs(0),
        };

        self.database.write(|transaction| {
            let before = load::<P>(transaction, policy_id)?;
            let changed = change(&before, context.at)?;
            let updated = record(transaction, &before, changed, &context)?;

            after(transaction, &updated, &context)?;

            Ok(updated)
        })
    }

    pub fn create<P: Policy>(
        &self,
        fields: &Snapshot,
        actor: &str,
        reason: Option<&str>,
        meta: &ClientMeta,
    ) -> Result<P, AppError> {
        let now = ledger::now();
        let policy: P = from_draft(fields, PolicyHeader::draft(actor, now))?;

        let context = ChangeContext {
            actor,
            reason,
            meta,
            at: now,
        };
        let log = PolicyChangeLog::created(&policy, &context)?;

        self.database.write(|transaction| {
            policies::insert(transaction, &policy)?;
            policies::insert_log(transaction, &log)
        })?;

        info!(policy_id = %policy.id(), kind = %P::KIND, actor, "Policy created");

        Ok(policy)
    }

    /// Field edits, drafts only.
    pub fn update<P: Policy>(
        &self,
        policy_id: Uuid,
        patch: &Snapshot,
        actor: &str,
        reason: &str,
        meta: &ClientMeta,
    ) -> Result<P, AppError> {
        self.mutate(
            policy_id,
            actor,
            Some(reason),
            meta,
            |before: &P, _| {
                workflow::ensure_editable(before)?;
                apply_patch(before, patch)
            },
            |_, _, _| Ok(()),
        )
    }

    pub fn deactivate<P: Policy>(
        &self,
        policy_id: Uuid,
        actor: &str,
        reason: &str,
        meta: &ClientMeta,
    ) -> Result<P, AppError> {
        self.mutate(
            policy_id,
            actor,
            Some(reason),
            meta,
            |before: &P, now| workflow::apply(before, Transition::Deactivate, now),
            |_, _, _| Ok(()),
        )
    }

    /// Draft to finalized. Every admin is asked to review it.
    pub fn submit<P: Policy>(
        &self,
        policy_id: Uuid,
        actor: &str,
        meta: &ClientMeta,
    ) -> Result<P, AppError> {
        self.mutate(
            policy_id,
            actor,
            None,
            meta,
            |before: &P, now| workflow::apply(before, Transition::Submit, now),
            |transaction, policy, context| {
                let type_name = P::KIND.type_name();

                for admin in users::ids_with_role(transaction, AccessRole::Admin)? {
                    notifications::insert(
                        transaction,
                        &Notification::new(
                            admin,
                            NotificationType::PolicyApproval,
                            "Policy awaiting approval",
                            format!(
                                "{type_name} {} (version {}) was submitted by {} and needs review.",
                                policy.id(),
                                policy.version(),
                                context.actor
                            ),
                        )
                        .about_policy(policy.id(), type_name),
                    )?;
                }

                if policy.header().created_by.as_deref() != Some(context.actor) {
                    notify_creator(
                        transaction,
                        policy,
                        NotificationType::PolicyFinalized,
                        "Policy finalized",
                        format!("Your {type_name} {} was finalized by {}.", policy.id(), context.actor),
                    )?;
                }

                Ok(())
            },
        )
    }

    /// Finalized to active. Other active policies of the kind are expired.
    pub fn approve<P: Policy>(
        &self,
        policy_id: Uuid,
        actor: &str,
        meta: &ClientMeta,
    ) -> Result<P, AppError> {
        self.mutate(
            policy_id,
            actor,
            None,
            meta,
            |before: &P, now| workflow::apply(before, Transition::Approve, now),
            |transaction, policy, context| {
                let reason = format!("Superseded by policy {}", policy.id());
                let superseding = ChangeContext {
                    reason: Some(&reason),
                    ..context.clone()
                };

                for previous in policies::active::<P>(transaction)? {
                    if previous.id() == policy.id() {
                        continue;
                    }

                    let expired = workflow::apply(&previous, Transition::Deactivate, context.at)?;
                    record(transaction, &previous, expired, &superseding)?;
                }

                notify_creator(
                    transaction,
                    policy,
                    NotificationType::PolicyApproved,
                    "Policy approved",
                    format!(
                        "Your {} {} was approved by {} and is now active.",
                        P::KIND.type_name(),
                        policy.id(),
                        context.actor
                    ),
                )
            },
        )
    }

    pub fn reject<P: Policy>(
        &self,
        policy_id: Uuid,
        actor: &str,
        reason: &str,
        meta: &ClientMeta,
    ) -> Result<P, AppError> {
        self.mutate(
            policy_id,
            actor,
            Some(reason),
            meta,
            |before: &P, now| workflow::apply(before, Transition::Reject, now),
            |transaction, policy, context| {
                notify_creator(
                    transaction,
                    policy,
                    NotificationType::PolicyRejected,
                    "Policy rejected",
                    format!(
                        "Your {} {} was rejected by {}: {}",
                        P::KIND.type_name(),
                        policy.id(),
                        context.actor,
                        context.reason.unwrap_or_default()
                    ),
                )
            },
        )
    }

    pub fn get<P: Policy>(&self, policy_id: Uuid) -> Result<P, AppError> {
        self.database
            .read(|connection| policies::find::<P>(connection, policy_id))?
            .ok_or(AppError::NotFound("Policy"))
    }

    pub fn list<P: Policy>(&self, status: Option<PolicyStatus>) -> Result<Vec<P>, AppError> {
        self.database
            .read(|connection| policies::list::<P>(connection, status))
    }

    /// The active policy of the kind, latest start first.
    pub fn active<P: Policy>(&self) -> Result<Option<P>, AppError> {
        Ok(self
            .database
            .read(|connection| policies::active::<P>(connection))?
            .into_iter()
            .next())
    }

    /// Change log of a policy of kind `P`, newest first.
    pub fn history<P: Policy>(&self, policy_id: Uuid) -> Result<Vec<PolicyChangeLog>, AppError> {
        self.database.read(|connection| {
            policies::find::<P>(connection, policy_id)?.ok_or(AppError::NotFound("Policy"))?;
            policies::history(connection, policy_id, true)
        })
    }

    /// Rebuilds the policy from its change log and compares it with the stored row.
    pub fn replay(&self, policy_id: Uuid) -> Result<ReplayReport, AppError> {
        let (kind, stored, logs) = self.database.read(|connection| {
            let (kind, stored) =
                policies::find_snapshot(connection, policy_id)?.ok_or(AppError::NotFound("Policy"))?;
            let logs = policies::history(connection, policy_id, false)?;

            Ok((kind, stored, logs))
        })?;

        let stored_version = stored.get("version").and_then(|version| version.as_u64());

        let report = match replay(&logs) {
            Ok(replayed) => ReplayReport {
                policy_id,
                kind,
                stored_version,
                matches: replayed == stored,
                replayed: Some(replayed),
                error: None,
            },
            Err(e) => ReplayReport {
                policy_id,
                kind,
                stored_version,
                matches: false,
                replayed: None,
                error: Some(e.to_string()),
            },
        };

        if !report.matches {
            warn!(%policy_id, "Change log does not reproduce the stored policy");
        }

        Ok(report)
    }

    /// Replays every stored policy.
    pub fn audit(&self) -> Result<Vec<ReplayReport>, AppError> {
        let ids = self.database.read(policies::all_ids)?;

        ids.into_iter()
            .map(|(_, policy_id)| self.replay(policy_id))
            .collect()
    }

    fn expire_kind<P: Policy>(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let due = self
            .database
            .read(|connection| policies::due_for_expiry(connection, P::KIND, now))?;

        let meta = ClientMeta::default();
        for policy_id in &due {
            self.mutate_at(
                *policy_id,
                SYSTEM_ACTOR,
                Some("Effective period ended"),
                &meta,
                now,
                |before: &P, at| workflow::apply(before, Transition::Expire, at),
                |_, _, _| Ok(()),
            )?;
        }

        Ok(due.len())
    }

    /// Expires active policies whose `effective_to` has passed.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        Ok(self.expire_kind::<DepositPolicy>(now)?
            + self.expire_kind::<LoanPolicy>(now)?
            + self.expire_kind::<InterestPolicy>(now)?
            + self.expire_kind::<InvestmentPolicy>(now)?
            + self.expire_kind::<PenaltyPolicy>(now)?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use ledger::{ChangeType, LedgerError};
    use serde_json::{Value, json};

    use super::*;
    use crate::database::{tests::memory, users::tests::user};

    const ADMIN: &str = "admin@yugantar.org";
    const SECRETARY: &str = "secretary@yugantar.org";

    fn object(value: Value) -> Snapshot {
        value.as_object().cloned().unwrap_or_default()
    }

    fn loan_fields() -> Snapshot {
        object(json!({
            "max_loan_amount": "500000",
            "min_loan_amount": "1000",
            "interest_rate": "12",
            "grace_period_days": 15,
        }))
    }

    fn service() -> (PolicyService, Database) {
        let database = memory();
        database
            .write(|transaction| {
                users::insert(transaction, &user(ADMIN, vec![AccessRole::User, AccessRole::Admin]))?;
                users::insert(
                    transaction,
                    &user(SECRETARY, vec![AccessRole::User, AccessRole::Moderator]),
                )
            })
            .unwrap();

        (PolicyService::new(database.clone()), database)
    }

    fn unread(database: &Database, email: &str) -> Vec<Notification> {
        database
            .read(|connection| {
                let user = users::find_by_email(connection, email)?.ok_or(AppError::NotFound("User"))?;
                notifications::list_for_user(connection, user.id, true)
            })
            .unwrap()
    }

    #[test]
    fn test_create_writes_a_created_log() {
        let (service, _) = service();
        let meta = ClientMeta::default();

        let policy: LoanPolicy = service.create(&loan_fields(), SECRETARY, None, &meta).unwrap();
        assert_eq!(policy.version(), 1);
        assert_eq!(policy.status(), PolicyStatus::Draft);

        let history = service.history::<LoanPolicy>(policy.id()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].change_type, ChangeType::Created);
        assert_eq!(history[0].version_before, None);
        assert_eq!(history[0].version_after, 1);
        assert_eq!(history[0].changed_by.as_deref(), Some(SECRETARY));
    }

    #[test]
    fn test_create_rejects_read_only_fields() {
        let (service, _) = service();
        let mut fields = loan_fields();
        fields.insert("version".into(), json!(7));

        let result = service.create::<LoanPolicy>(&fields, SECRETARY, None, &ClientMeta::default());
        assert!(matches!(
            result,
            Err(AppError::Ledger(LedgerError::Policy(PolicyError::ReadOnlyField(_))))
        ));
    }

    #[test]
    fn test_every_change_bumps_the_version_once() {
        let (service, _) = service();
        let meta = ClientMeta::default();

        let created: LoanPolicy = service.create(&loan_fields(), SECRETARY, None, &meta).unwrap();
        let updated: LoanPolicy = service
            .update(
                created.id(),
                &object(json!({ "interest_rate": "10" })),
                SECRETARY,
                "Lower rate",
                &meta,
            )
            .unwrap();
        let submitted: LoanPolicy = service.submit(created.id(), SECRETARY, &meta).unwrap();
        let approved: LoanPolicy = service.approve(created.id(), ADMIN, &meta).unwrap();

        assert_eq!(updated.version(), 2);
        assert_eq!(submitted.version(), 3);
        assert_eq!(approved.version(), 4);
        assert!(approved.header().is_active);

        let history = service.history::<LoanPolicy>(created.id()).unwrap();
        let versions: Vec<_> = history.iter().map(|log| log.version_after).collect();
        assert_eq!(versions, vec![4, 3, 2, 1]);
        assert_eq!(history[0].change_type, ChangeType::Activated);
        assert_eq!(history[2].changed_reason.as_deref(), Some("Lower rate"));
        assert_eq!(
            history[2].changes.get("interest_rate").map(|change| &change.new),
            Some(&json!("10"))
        );

        let report = service.replay(created.id()).unwrap();
        assert!(report.matches);
        assert_eq!(report.stored_version, Some(4));
    }

    #[test]
    fn test_only_drafts_are_editable() {
        let (service, _) = service();
        let meta = ClientMeta::default();

        let created: LoanPolicy = service.create(&loan_fields(), SECRETARY, None, &meta).unwrap();
        service.submit::<LoanPolicy>(created.id(), SECRETARY, &meta).unwrap();

        let result = service.update::<LoanPolicy>(
            created.id(),
            &object(json!({ "interest_rate": "10" })),
            SECRETARY,
            "Too late",
            &meta,
        );
        assert!(matches!(
            result,
            Err(AppError::Ledger(LedgerError::Policy(PolicyError::InvalidTransition { .. })))
        ));

        let history = service.history::<LoanPolicy>(created.id()).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_invalid_transition_writes_nothing() {
        let (service, _) = service();
        let meta = ClientMeta::default();

        let created: LoanPolicy = service.create(&loan_fields(), SECRETARY, None, &meta).unwrap();
        assert!(service.approve::<LoanPolicy>(created.id(), ADMIN, &meta).is_err());

        let stored: LoanPolicy = service.get(created.id()).unwrap();
        assert_eq!(stored, created);
        assert_eq!(service.history::<LoanPolicy>(created.id()).unwrap().len(), 1);
    }

    #[test]
    fn test_submit_notifies_admins() {
        let (service, database) = service();
        let meta = ClientMeta::default();

        let created: LoanPolicy = service.create(&loan_fields(), SECRETARY, None, &meta).unwrap();
        service.submit::<LoanPolicy>(created.id(), SECRETARY, &meta).unwrap();

        let inbox = unread(&database, ADMIN);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::PolicyApproval);
        assert_eq!(inbox[0].policy_id, Some(created.id()));
        assert!(unread(&database, SECRETARY).is_empty());
    }

    #[test]
    fn test_reject_notifies_the_creator() {
        let (service, database) = service();
        let meta = ClientMeta::default();

        let created: LoanPolicy = service.create(&loan_fields(), SECRETARY, None, &meta).unwrap();
        service.submit::<LoanPolicy>(created.id(), SECRETARY, &meta).unwrap();
        let rejected: LoanPolicy = service
            .reject(created.id(), ADMIN, "Rate too high", &meta)
            .unwrap();

        assert_eq!(rejected.status(), PolicyStatus::Void);
        assert!(rejected.header().effective_to.is_some());

        let inbox = unread(&database, SECRETARY);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::PolicyRejected);
        assert!(inbox[0].message.contains("Rate too high"));
    }

    #[test]
    fn test_approval_supersedes_the_active_policy() {
        let (service, _) = service();
        let meta = ClientMeta::default();

        let mut ids = Vec::new();
        for _ in 0..2 {
            let created: LoanPolicy = service.create(&loan_fields(), SECRETARY, None, &meta).unwrap();
            service.submit::<LoanPolicy>(created.id(), SECRETARY, &meta).unwrap();
            service.approve::<LoanPolicy>(created.id(), ADMIN, &meta).unwrap();
            ids.push(created.id());
        }

        let active = service.list::<LoanPolicy>(Some(PolicyStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), ids[1]);

        let first: LoanPolicy = service.get(ids[0]).unwrap();
        assert_eq!(first.status(), PolicyStatus::Expired);

        let history = service.history::<LoanPolicy>(ids[0]).unwrap();
        assert_eq!(history[0].change_type, ChangeType::Deactivated);
        assert_eq!(history[0].changed_by.as_deref(), Some(ADMIN));
        assert!(service.replay(ids[0]).unwrap().matches);
    }

    #[test]
    fn test_history_is_scoped_to_the_kind() {
        let (service, _) = service();

        let created: LoanPolicy = service
            .create(&loan_fields(), SECRETARY, None, &ClientMeta::default())
            .unwrap();

        assert!(matches!(
            service.history::<DepositPolicy>(created.id()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_expire_due_closes_elapsed_policies() {
        let (service, _) = service();
        let meta = ClientMeta::default();
        let now = ledger::now();

        let mut fields = loan_fields();
        fields.insert("effective_from".into(), json!(now - Duration::days(30)));
        fields.insert("effective_to".into(), json!(now - Duration::days(1)));

        let created: LoanPolicy = service.create(&fields, SECRETARY, None, &meta).unwrap();
        service.submit::<LoanPolicy>(created.id(), SECRETARY, &meta).unwrap();
        service.approve::<LoanPolicy>(created.id(), ADMIN, &meta).unwrap();

        assert_eq!(service.expire_due(now).unwrap(), 1);
        assert_eq!(service.expire_due(now).unwrap(), 0);

        let expired: LoanPolicy = service.get(created.id()).unwrap();
        assert_eq!(expired.status(), PolicyStatus::Expired);
        assert_eq!(expired.header().updated_by.as_deref(), Some(SYSTEM_ACTOR));
        assert!(service.replay(created.id()).unwrap().matches);
    }

    #[test]
    fn test_expire_due_uses_the_given_time() {
        let (service, _) = service();
        let meta = ClientMeta::default();
        let now = ledger::now();

        let mut fields = loan_fields();
        fields.insert("effective_to".into(), json!(now + Duration::days(1)));

        let created: LoanPolicy = service.create(&fields, SECRETARY, None, &meta).unwrap();
        service.submit::<LoanPolicy>(created.id(), SECRETARY, &meta).unwrap();
        service.approve::<LoanPolicy>(created.id(), ADMIN, &meta).unwrap();

        assert_eq!(service.expire_due(now).unwrap(), 0);

        let later = now + Duration::days(2);
        assert_eq!(service.expire_due(later).unwrap(), 1);

        let history = service.history::<LoanPolicy>(created.id()).unwrap();
        assert_eq!(history[0].change_type, ChangeType::Deactivated);
        assert_eq!(history[0].changed_at, later);
        assert_eq!(history[0].changed_by.as_deref(), Some(SYSTEM_ACTOR));
        assert!(service.replay(created.id()).unwrap().matches);
    }

    #[test]
    fn test_audit_covers_every_policy() {
        let (service, _) = service();
        let meta = ClientMeta::default();

        service.create::<LoanPolicy>(&loan_fields(), SECRETARY, None, &meta).unwrap();
        service
            .create::<InterestPolicy>(&Snapshot::new(), SECRETARY, None, &meta)
            .unwrap();

        let reports = service.audit().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|report| report.matches));
    }
}
