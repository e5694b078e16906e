//! Loans copy their rate, grace period, term and renewal limit from the loan
//! policy active when they are applied for. Later policy changes do not touch
//! existing loans.
use chrono::{DateTime, Duration, Utc};
use ledger::{
    Paisa, Policy,
    loan::{LoanStatement, allocate_payment, check_application, maturity_date, statement},
    money::rupees_to_paisa,
    policy::{InterestPolicy, LoanPolicy},
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    database::{Database, fines, loans, notifications, policies, receipts},
    error::AppError,
    models::{Fine, FineType, Loan, LoanPayment, LoanStatus, Notification, NotificationType},
};

#[derive(Debug, Clone, Deserialize)]
pub struct LoanApplication {
    pub amount_paisa: Paisa,
    #[serde(default)]
    pub collateral: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub loan: Loan,
    pub payment: LoanPayment,
    pub fine: Option<Fine>,
    pub statement: LoanStatement,
}

fn to_paisa(amount: Decimal) -> Result<Paisa, AppError> {
    rupees_to_paisa(amount).ok_or_else(|| AppError::Internal(format!("amount {amount} out of range")))
}

fn load(connection: &Connection, id: Uuid) -> Result<Loan, AppError> {
    loans::find(connection, id)?.ok_or(AppError::NotFound("Loan"))
}

fn require_status(loan: &Loan, status: LoanStatus) -> Result<(), AppError> {
    if loan.status != status {
        return Err(AppError::BadRequest(format!(
            "Loan is {}, expected {status}",
            loan.status
        )));
    }

    Ok(())
}

fn penalty_rate(connection: &Connection) -> Result<Option<Decimal>, AppError> {
    Ok(policies::active::<InterestPolicy>(connection)?
        .first()
        .map(|policy| policy.penalty_interest_rate))
}

fn current_statement(
    connection: &Connection,
    loan: &Loan,
    now: DateTime<Utc>,
) -> Result<LoanStatement, AppError> {
    let terms = loan
        .terms()
        .ok_or_else(|| AppError::BadRequest("Loan has not been disbursed".into()))?;

    Ok(statement(
        &terms,
        loan.total_paid_paisa.to_rupees(),
        loan.accrual(),
        penalty_rate(connection)?,
        now,
    ))
}

fn notify(connection: &Connection, loan: &Loan, title: &str, message: String) -> Result<(), AppError> {
    notifications::insert(
        connection,
        &Notification::new(loan.user_id, NotificationType::General, title, message),
    )
}

pub fn apply(
    database: &Database,
    user_id: Uuid,
    application: LoanApplication,
) -> Result<Loan, AppError> {
    if !application.amount_paisa.is_positive() {
        return Err(AppError::Validation("Loan amount must be positive".into()));
    }

    let collateral = application
        .collateral
        .map(|collateral| collateral.trim().to_string())
        .filter(|collateral| !collateral.is_empty());

    database.write(|transaction| {
        let policy = policies::active::<LoanPolicy>(transaction)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::BadRequest("No active loan policy".into()))?;

        check_application(
            &policy,
            application.amount_paisa.to_rupees(),
            collateral.is_some(),
        )?;

        let now = ledger::now();
        let loan = Loan {
            id: Uuid::new_v4(),
            user_id,
            policy_id: policy.id(),
            principal_paisa: application.amount_paisa,
            interest_rate: policy.interest_rate,
            grace_period_days: policy.grace_period_days,
            term_days: policy.term_days,
            max_renewals: policy.max_renewals,
            start_date: None,
            maturity_date: None,
            status: LoanStatus::Pending,
            approved_by: None,
            total_paid_paisa: Paisa::ZERO,
            penalty_accrued_paisa: Paisa::ZERO,
            penalty_accrued_at: None,
            renewals: 0,
            collateral,
            notes: application.notes,
            created_at: now,
            updated_at: now,
        };

        loans::insert(transaction, &loan)?;
        info!(loan_id = %loan.id, %user_id, principal = %loan.principal_paisa, "Loan applied for");

        Ok(loan)
    })
}

/// Disburses a pending loan now.
pub fn approve(database: &Database, actor: &str, id: Uuid) -> Result<Loan, AppError> {
    database.write(|transaction| {
        let mut loan = load(transaction, id)?;
        require_status(&loan, LoanStatus::Pending)?;

        let now = ledger::now();
        loan.status = LoanStatus::Active;
        loan.start_date = Some(now);
        loan.maturity_date = Some(maturity_date(now, loan.term_days));
        loan.approved_by = Some(actor.to_string());
        loan.updated_at = now;
        loans::update(transaction, &loan)?;

        notify(
            transaction,
            &loan,
            "Loan approved",
            format!("Your loan of {} was approved and disbursed.", loan.principal_paisa),
        )?;
        info!(loan_id = %loan.id, actor, "Loan approved");

        Ok(loan)
    })
}

pub fn reject(
    database: &Database,
    actor: &str,
    id: Uuid,
    reason: Option<&str>,
) -> Result<Loan, AppError> {
    database.write(|transaction| {
        let mut loan = load(transaction, id)?;
        require_status(&loan, LoanStatus::Pending)?;

        loan.status = LoanStatus::Rejected;
        if let Some(reason) = reason {
            loan.notes = Some(reason.to_string());
        }
        loan.updated_at = ledger::now();
        loans::update(transaction, &loan)?;

        notify(
            transaction,
            &loan,
            "Loan rejected",
            format!(
                "Your loan application of {} was rejected: {}",
                loan.principal_paisa,
                reason.unwrap_or("no reason given")
            ),
        )?;
        info!(loan_id = %loan.id, actor, "Loan rejected");

        Ok(loan)
    })
}

pub fn find(database: &Database, id: Uuid) -> Result<Loan, AppError> {
    database.read(|connection| load(connection, id))
}

pub fn loan_statement(
    database: &Database,
    loan: &Loan,
    now: DateTime<Utc>,
) -> Result<LoanStatement, AppError> {
    database.read(|connection| current_statement(connection, loan, now))
}

fn check_receipt(connection: &Connection, loan: &Loan, receipt_id: Uuid) -> Result<(), AppError> {
    let receipt = receipts::find(connection, receipt_id)?
        .ok_or_else(|| AppError::BadRequest("Receipt not found".into()))?;

    if receipt.user_id != loan.user_id {
        return Err(AppError::BadRequest(
            "Receipt belongs to a different member".into(),
        ));
    }

    Ok(())
}

/// Applies a repayment. Penalty accrued since the previous payment is brought
/// onto the loan and recorded as a `late_loan_payment` fine. The payment
/// settles penalty first, then interest, then principal.
pub fn record_payment(
    database: &Database,
    actor: &str,
    id: Uuid,
    amount: Paisa,
    receipt_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<PaymentReceipt, AppError> {
    if !amount.is_positive() {
        return Err(AppError::Validation("Payment amount must be positive".into()));
    }

    database.write(|transaction| {
        let mut loan = load(transaction, id)?;
        require_status(&loan, LoanStatus::Active)?;
        if let Some(receipt_id) = receipt_id {
            check_receipt(transaction, &loan, receipt_id)?;
        }

        let before = current_statement(transaction, &loan, now)?;
        let outstanding = to_paisa(before.outstanding)?;
        if amount > outstanding {
            return Err(AppError::Validation(format!(
                "Payment of {amount} exceeds the outstanding balance of {outstanding}"
            )));
        }

        let penalty = to_paisa(before.penalty)?;
        let fine = if penalty > loan.penalty_accrued_paisa {
            let fine = Fine {
                id: Uuid::new_v4(),
                user_id: loan.user_id,
                deposit_id: None,
                loan_id: Some(loan.id),
                amount_paisa: Paisa(penalty.0 - loan.penalty_accrued_paisa.0),
                fine_type: FineType::LateLoanPayment,
                reason: Some("Loan repaid after the grace period".into()),
                created_at: now,
            };
            fines::insert(transaction, &fine)?;
            Some(fine)
        } else {
            None
        };
        if before.overdue {
            loan.penalty_accrued_paisa = penalty;
            loan.penalty_accrued_at = Some(now);
        }

        let (penalty_settled, interest_settled) = loans::settled(transaction, loan.id)?;
        let split = allocate_payment(
            amount,
            Paisa(penalty.0 - penalty_settled.0),
            Paisa(to_paisa(before.interest)?.0 - interest_settled.0),
        );
        let payment = LoanPayment {
            id: Uuid::new_v4(),
            loan_id: loan.id,
            receipt_id,
            amount_paisa: amount,
            principal_paisa: split.principal,
            interest_paisa: split.interest,
            penalty_paisa: split.penalty,
            recorded_by: actor.to_string(),
            paid_at: now,
        };
        loans::insert_payment(transaction, &payment)?;

        loan.total_paid_paisa = Paisa(loan.total_paid_paisa.0 + amount.0);
        if amount == outstanding {
            loan.status = LoanStatus::Paid;
        }
        loan.updated_at = ledger::now();
        loans::update(transaction, &loan)?;

        info!(loan_id = %loan.id, %amount, actor, status = %loan.status, "Loan payment recorded");

        let statement = current_statement(transaction, &loan, now)?;
        Ok(PaymentReceipt {
            loan,
            payment,
            fine,
            statement,
        })
    })
}

pub fn payments(database: &Database, id: Uuid) -> Result<Vec<LoanPayment>, AppError> {
    database.read(|connection| loans::list_payments(connection, id))
}

/// Extends maturity by one more term.
pub fn renew(database: &Database, id: Uuid) -> Result<Loan, AppError> {
    database.write(|transaction| {
        let mut loan = load(transaction, id)?;
        require_status(&loan, LoanStatus::Active)?;

        if loan.max_renewals.is_some_and(|max| loan.renewals >= max) {
            return Err(AppError::BadRequest("Loan cannot be renewed again".into()));
        }

        let maturity = loan
            .maturity_date
            .ok_or_else(|| AppError::BadRequest("Loan has not been disbursed".into()))?;
        loan.maturity_date = Some(maturity + Duration::days(i64::from(loan.term_days)));
        loan.renewals += 1;
        loan.updated_at = ledger::now();
        loans::update(transaction, &loan)?;

        info!(loan_id = %loan.id, renewals = loan.renewals, "Loan renewed");

        Ok(loan)
    })
}

#[cfg(test)]
mod tests {
    use ledger::{ClientMeta, LedgerError, LoanError, policy::Snapshot};
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        database::{tests::memory, users},
        models::{AccessRole, Receipt},
        services::policy::PolicyService,
    };

    const ADMIN: &str = "admin@yugantar.org";
    const PRINCIPAL: Paisa = Paisa(10_000_000);

    fn object(value: Value) -> Snapshot {
        value.as_object().cloned().unwrap_or_default()
    }

    fn activate<P: Policy>(service: &PolicyService, fields: Value) {
        let meta = ClientMeta::default();
        let policy: P = service.create(&object(fields), ADMIN, None, &meta).unwrap();
        service.submit::<P>(policy.id(), ADMIN, &meta).unwrap();
        service.approve::<P>(policy.id(), ADMIN, &meta).unwrap();
    }

    fn setup(with_interest_policy: bool) -> (Database, Uuid) {
        let database = memory();
        let member = users::tests::user("member@example.com", vec![AccessRole::User]);
        database
            .write(|transaction| {
                users::insert(transaction, &users::tests::user(ADMIN, vec![AccessRole::Admin]))?;
                users::insert(transaction, &member)
            })
            .unwrap();

        let service = PolicyService::new(database.clone());
        activate::<LoanPolicy>(
            &service,
            json!({
                "max_loan_amount": "500000",
                "min_loan_amount": "1000",
                "interest_rate": "12",
                "grace_period_days": 15,
                "max_renewals": 1,
            }),
        );
        if with_interest_policy {
            activate::<InterestPolicy>(&service, json!({ "penalty_interest_rate": "2" }));
        }

        (database, member.id)
    }

    fn application(amount: Paisa) -> LoanApplication {
        LoanApplication {
            amount_paisa: amount,
            collateral: None,
            notes: None,
        }
    }

    fn disbursed(database: &Database, member: Uuid) -> Loan {
        let loan = apply(database, member, application(PRINCIPAL)).unwrap();
        approve(database, ADMIN, loan.id).unwrap()
    }

    #[test]
    fn test_application_bounds() {
        let (database, member) = setup(false);

        let result = apply(&database, member, application(Paisa(600_000_00)));
        assert!(matches!(
            result,
            Err(AppError::Ledger(LedgerError::Loan(LoanError::AmountOutOfRange { .. })))
        ));

        let loan = apply(&database, member, application(PRINCIPAL)).unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.interest_rate, Decimal::from(12));
        assert_eq!(loan.term_days, 365);
        assert!(loan.terms().is_none());
    }

    #[test]
    fn test_approval_disburses() {
        let (database, member) = setup(false);
        let loan = disbursed(&database, member);

        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.approved_by.as_deref(), Some(ADMIN));
        let start = loan.start_date.unwrap();
        assert_eq!(loan.maturity_date, Some(start + Duration::days(365)));

        assert!(matches!(
            approve(&database, ADMIN, loan.id),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_payments_reduce_outstanding() {
        let (database, member) = setup(false);
        let loan = disbursed(&database, member);
        let now = loan.start_date.unwrap() + Duration::days(365);

        let statement = loan_statement(&database, &loan, now).unwrap();
        assert_eq!(statement.interest, Decimal::from(12_000));
        assert_eq!(statement.outstanding, Decimal::from(112_000));

        let receipt = record_payment(&database, ADMIN, loan.id, Paisa(6_000_000), None, now).unwrap();
        assert_eq!(receipt.loan.status, LoanStatus::Active);
        assert_eq!(receipt.statement.outstanding, Decimal::from(52_000));
        assert!(receipt.fine.is_none());
        assert_eq!(receipt.payment.interest_paisa, Paisa(1_200_000));
        assert_eq!(receipt.payment.principal_paisa, Paisa(4_800_000));

        assert!(matches!(
            record_payment(&database, ADMIN, loan.id, Paisa(5_200_001), None, now),
            Err(AppError::Validation(_))
        ));

        let receipt = record_payment(&database, ADMIN, loan.id, Paisa(5_200_000), None, now).unwrap();
        assert_eq!(receipt.loan.status, LoanStatus::Paid);
        assert_eq!(receipt.statement.outstanding, Decimal::ZERO);
        assert_eq!(receipt.payment.interest_paisa, Paisa::ZERO);
        assert_eq!(receipt.payment.principal_paisa, Paisa(5_200_000));

        let payments = payments(&database, loan.id).unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].amount_paisa, Paisa(6_000_000));
        assert_eq!(payments[1].recorded_by, ADMIN);
    }

    #[test]
    fn test_late_payment_is_fined() {
        let (database, member) = setup(true);
        let loan = disbursed(&database, member);
        let now = loan.start_date.unwrap() + Duration::days(365 + 15 + 73);

        let statement = loan_statement(&database, &loan, now).unwrap();
        assert!(statement.overdue);
        assert_eq!(statement.penalty, Decimal::from(448));

        let receipt = record_payment(&database, ADMIN, loan.id, Paisa(11_244_800), None, now).unwrap();
        assert_eq!(receipt.loan.status, LoanStatus::Paid);
        assert_eq!(receipt.loan.penalty_accrued_paisa, Paisa(44_800));
        assert_eq!(receipt.payment.penalty_paisa, Paisa(44_800));

        let fine = receipt.fine.unwrap();
        assert_eq!(fine.amount_paisa, Paisa(44_800));
        assert_eq!(fine.fine_type, FineType::LateLoanPayment);
        assert_eq!(fine.loan_id, Some(loan.id));
    }

    #[test]
    fn test_partial_payment_after_grace_keeps_penalty() {
        let (database, member) = setup(true);
        let loan = disbursed(&database, member);
        let now = loan.start_date.unwrap() + Duration::days(365 + 15 + 73);

        let before = loan_statement(&database, &loan, now).unwrap();
        assert_eq!(before.outstanding, Decimal::new(11_244_800, 2));

        let receipt = record_payment(&database, ADMIN, loan.id, Paisa(5_000_000), None, now).unwrap();
        assert_eq!(receipt.statement.outstanding, Decimal::new(6_244_800, 2));
        assert_eq!(receipt.statement.penalty, Decimal::from(448));
        assert_eq!(receipt.loan.status, LoanStatus::Active);
        assert_eq!(receipt.fine.unwrap().amount_paisa, Paisa(44_800));
        assert_eq!(receipt.payment.penalty_paisa, Paisa(44_800));
        assert_eq!(receipt.payment.interest_paisa, Paisa(1_200_000));
        assert_eq!(receipt.payment.principal_paisa, Paisa(3_755_200));

        let stored = find(&database, loan.id).unwrap();
        assert_eq!(stored.penalty_accrued_paisa, Paisa(44_800));
        assert_eq!(stored.penalty_accrued_at, Some(now));
        let statement = loan_statement(&database, &stored, now).unwrap();
        assert_eq!(statement.outstanding, Decimal::new(6_244_800, 2));

        // 62448.00 at 2% for another 73 days
        let later = now + Duration::days(73);
        let statement = loan_statement(&database, &stored, later).unwrap();
        assert_eq!(statement.penalty, Decimal::new(69_779, 2));
        assert_eq!(statement.outstanding, Decimal::new(6_269_779, 2));

        let receipt =
            record_payment(&database, ADMIN, loan.id, Paisa(6_269_779), None, later).unwrap();
        assert_eq!(receipt.loan.status, LoanStatus::Paid);
        assert_eq!(receipt.fine.unwrap().amount_paisa, Paisa(24_979));
        assert_eq!(receipt.payment.penalty_paisa, Paisa(24_979));
        assert_eq!(receipt.payment.interest_paisa, Paisa::ZERO);
        assert_eq!(receipt.payment.principal_paisa, Paisa(6_244_800));

        let fines = database
            .read(|connection| fines::list_for_user(connection, member))
            .unwrap();
        assert_eq!(fines.len(), 2);
    }

    #[test]
    fn test_payment_receipt_must_belong_to_the_borrower() {
        let (database, member) = setup(false);
        let loan = disbursed(&database, member);
        let now = loan.start_date.unwrap() + Duration::days(30);

        let receipt = |user_id| Receipt {
            id: Uuid::new_v4(),
            user_id,
            deposit_id: None,
            amount_paisa: Paisa(1_000_000),
            charge_paisa: None,
            reference: Some("TXN-1".into()),
            paid_at: Some(now),
            notes: None,
            created_at: now,
        };
        let own = receipt(member);
        let other = users::tests::user("other@example.com", vec![AccessRole::User]);
        let foreign = receipt(other.id);
        database
            .write(|transaction| {
                users::insert(transaction, &other)?;
                receipts::insert(transaction, &own)?;
                receipts::insert(transaction, &foreign)
            })
            .unwrap();

        for receipt_id in [foreign.id, Uuid::new_v4()] {
            assert!(matches!(
                record_payment(&database, ADMIN, loan.id, Paisa(1_000_000), Some(receipt_id), now),
                Err(AppError::BadRequest(_))
            ));
        }
        assert!(payments(&database, loan.id).unwrap().is_empty());

        let receipt =
            record_payment(&database, ADMIN, loan.id, Paisa(1_000_000), Some(own.id), now).unwrap();
        assert_eq!(receipt.payment.receipt_id, Some(own.id));
    }

    #[test]
    fn test_no_penalty_without_interest_policy() {
        let (database, member) = setup(false);
        let loan = disbursed(&database, member);
        let now = loan.start_date.unwrap() + Duration::days(500);

        let statement = loan_statement(&database, &loan, now).unwrap();
        assert!(statement.overdue);
        assert_eq!(statement.penalty, Decimal::ZERO);
        assert_eq!(statement.outstanding, Decimal::from(112_000));
    }

    #[test]
    fn test_renewal_limit() {
        let (database, member) = setup(false);
        let loan = disbursed(&database, member);
        let maturity = loan.maturity_date.unwrap();

        let renewed = renew(&database, loan.id).unwrap();
        assert_eq!(renewed.renewals, 1);
        assert_eq!(renewed.maturity_date, Some(maturity + Duration::days(365)));

        assert!(matches!(renew(&database, loan.id), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_rejection_notifies_the_member() {
        let (database, member) = setup(false);
        let loan = apply(&database, member, application(PRINCIPAL)).unwrap();

        let rejected = reject(&database, ADMIN, loan.id, Some("Incomplete documents")).unwrap();
        assert_eq!(rejected.status, LoanStatus::Rejected);

        let unread = database
            .read(|connection| notifications::list_for_user(connection, member, true))
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert!(unread[0].message.contains("Incomplete documents"));
    }
}
