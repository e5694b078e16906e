//! Member deposits against the active deposit policy, and the fines they
//! attract once verified late.
use chrono::{DateTime, Utc};
use ledger::{
    Paisa, Policy,
    money::rupees_to_paisa,
    policy::DepositPolicy,
    schedule::{DepositTiming, calculate_due_date, calculate_late_fine},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    database::{Database, deposits, fines, notifications, policies},
    error::AppError,
    models::{Deposit, Fine, FineType, Notification, NotificationType, Verification},
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewDeposit {
    pub amount_paisa: Paisa,
    #[serde(default)]
    pub deposited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub receipt_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepositUpdate {
    pub amount_paisa: Option<Paisa>,
    pub deposited_at: Option<DateTime<Utc>>,
    pub receipt_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verified {
    pub deposit: Deposit,
    pub fine: Option<Fine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFine {
    pub user_id: Uuid,
    pub amount_paisa: Paisa,
    #[serde(default = "other_fine")]
    pub fine_type: FineType,
    #[serde(default)]
    pub reason: Option<String>,
}

fn other_fine() -> FineType {
    FineType::Other
}

fn check_amount(amount: Paisa) -> Result<(), AppError> {
    if !amount.is_positive() {
        return Err(AppError::Validation("Deposited amount must be positive".into()));
    }

    Ok(())
}

fn active_policy(connection: &Connection) -> Result<DepositPolicy, AppError> {
    policies::active::<DepositPolicy>(connection)?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("No active deposit policy".into()))
}

/// Deposit that the caller owns and that is still awaiting verification.
fn pending_owned(connection: &Connection, user_id: Uuid, id: Uuid) -> Result<Deposit, AppError> {
    let deposit = deposits::find(connection, id)?
        .filter(|deposit| deposit.user_id == user_id)
        .ok_or(AppError::NotFound("Deposit"))?;

    if deposit.verification != Verification::Pending {
        return Err(AppError::BadRequest(
            "Only pending deposits can be changed".into(),
        ));
    }

    Ok(deposit)
}

pub fn create(database: &Database, user_id: Uuid, new: NewDeposit) -> Result<Deposit, AppError> {
    check_amount(new.amount_paisa)?;

    database.write(|transaction| {
        let policy = active_policy(transaction)?;

        if let Some(limit) = policy.max_occurrences {
            if deposits::count_for_policy(transaction, user_id, policy.id())? >= limit {
                return Err(AppError::BadRequest(format!(
                    "The deposit policy allows at most {limit} deposits"
                )));
            }
        }

        let due_at = match new.due_at {
            Some(due_at) => due_at,
            None => {
                let reference = deposits::last_counted(transaction, user_id)?
                    .map_or(policy.header.effective_from, |last| last.due_at);
                calculate_due_date(&policy, reference)?
            }
        };

        let now = ledger::now();
        let deposited_at = new.deposited_at.unwrap_or(now);
        let deposit = Deposit {
            id: Uuid::new_v4(),
            user_id,
            policy_id: policy.id(),
            amount_paisa: new.amount_paisa,
            amount_due_paisa: Paisa(policy.amount_paisa),
            deposited_at,
            due_at,
            timing: DepositTiming::classify(deposited_at, due_at),
            verification: Verification::Pending,
            verified_by: None,
            receipt_id: new.receipt_id,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };

        deposits::insert(transaction, &deposit)?;
        info!(deposit_id = %deposit.id, %user_id, timing = %deposit.timing, "Deposit recorded");

        Ok(deposit)
    })
}

pub fn update(
    database: &Database,
    user_id: Uuid,
    id: Uuid,
    update: DepositUpdate,
) -> Result<Deposit, AppError> {
    database.write(|transaction| {
        let mut deposit = pending_owned(transaction, user_id, id)?;

        if let Some(amount) = update.amount_paisa {
            check_amount(amount)?;
            deposit.amount_paisa = amount;
        }
        if let Some(deposited_at) = update.deposited_at {
            deposit.deposited_at = deposited_at;
            deposit.timing = DepositTiming::classify(deposited_at, deposit.due_at);
        }
        if update.receipt_id.is_some() {
            deposit.receipt_id = update.receipt_id;
        }
        if update.notes.is_some() {
            deposit.notes = update.notes;
        }
        deposit.updated_at = ledger::now();

        deposits::update(transaction, &deposit)?;

        Ok(deposit)
    })
}

pub fn delete(database: &Database, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    database.write(|transaction| {
        pending_owned(transaction, user_id, id)?;
        deposits::delete(transaction, id)
    })
}

/// Moderator decision on a pending deposit. A verified late deposit is fined
/// with the policy it was made under.
pub fn verify(
    database: &Database,
    moderator: &str,
    id: Uuid,
    approve: bool,
) -> Result<Verified, AppError> {
    database.write(|transaction| {
        let mut deposit = deposits::find(transaction, id)?.ok_or(AppError::NotFound("Deposit"))?;

        if deposit.verification != Verification::Pending {
            return Err(AppError::BadRequest("Deposit was already reviewed".into()));
        }

        deposit.verification = if approve {
            Verification::Verified
        } else {
            Verification::Rejected
        };
        deposit.verified_by = Some(moderator.to_string());
        deposit.updated_at = ledger::now();
        deposits::update(transaction, &deposit)?;

        let fine = if approve && deposit.timing == DepositTiming::Late {
            late_fine(transaction, &deposit)?
        } else {
            None
        };

        info!(deposit_id = %deposit.id, verification = %deposit.verification, moderator, "Deposit reviewed");

        Ok(Verified { deposit, fine })
    })
}

fn late_fine(connection: &Connection, deposit: &Deposit) -> Result<Option<Fine>, AppError> {
    let policy = policies::find::<DepositPolicy>(connection, deposit.policy_id)?
        .ok_or(AppError::NotFound("Policy"))?;

    let amount = calculate_late_fine(
        deposit.deposited_at,
        deposit.due_at,
        policy.late_deposit_fine,
        deposit.amount_due_paisa.to_rupees(),
    );

    let Some(amount_paisa) = rupees_to_paisa(amount).filter(|amount| amount.is_positive()) else {
        return Ok(None);
    };

    let fine = Fine {
        id: Uuid::new_v4(),
        user_id: deposit.user_id,
        deposit_id: Some(deposit.id),
        loan_id: None,
        amount_paisa,
        fine_type: FineType::LateDeposit,
        reason: Some(format!("Deposit due {} was late", deposit.due_at.date_naive())),
        created_at: ledger::now(),
    };
    fines::insert(connection, &fine)?;

    Ok(Some(fine))
}

/// Manually recorded fine. The member is notified.
pub fn record_fine(database: &Database, new: NewFine) -> Result<Fine, AppError> {
    if !new.amount_paisa.is_positive() {
        return Err(AppError::Validation("Fine amount must be positive".into()));
    }

    let fine = Fine {
        id: Uuid::new_v4(),
        user_id: new.user_id,
        deposit_id: None,
        loan_id: None,
        amount_paisa: new.amount_paisa,
        fine_type: new.fine_type,
        reason: new.reason,
        created_at: ledger::now(),
    };

    database.write(|transaction| {
        fines::insert(transaction, &fine)?;
        notifications::insert(
            transaction,
            &Notification::new(
                fine.user_id,
                NotificationType::General,
                "Fine recorded",
                format!(
                    "A {} fine of {} was recorded: {}",
                    fine.fine_type,
                    fine.amount_paisa,
                    fine.reason.as_deref().unwrap_or("no reason given")
                ),
            ),
        )
    })?;

    Ok(fine)
}
