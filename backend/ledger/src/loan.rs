//! Loan maturity, simple interest and overdue penalties.
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{error::LoanError, money::Paisa, policy::LoanPolicy};

const DAYS_PER_YEAR: i64 = 365;

pub fn maturity_date(start: DateTime<Utc>, term_days: u32) -> DateTime<Utc> {
    start + Duration::days(i64::from(term_days))
}

/// Simple interest over whole days on a 365 day year.
pub fn accrued_interest(
    principal: Decimal,
    annual_rate: Decimal,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Decimal {
    if to <= from {
        return Decimal::ZERO;
    }

    let days = Decimal::from((to - from).num_days());

    (principal * annual_rate / Decimal::ONE_HUNDRED * days / Decimal::from(DAYS_PER_YEAR))
        .round_dp(2)
}

fn penalty_starts(maturity: DateTime<Utc>, grace_days: u32) -> DateTime<Utc> {
    maturity + Duration::days(i64::from(grace_days))
}

pub fn is_overdue(maturity: DateTime<Utc>, grace_days: u32, now: DateTime<Utc>) -> bool {
    now > penalty_starts(maturity, grace_days)
}

pub fn overdue_penalty(
    outstanding: Decimal,
    penalty_rate: Decimal,
    maturity: DateTime<Utc>,
    grace_days: u32,
    now: DateTime<Utc>,
) -> Decimal {
    if outstanding <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    accrued_interest(
        outstanding,
        penalty_rate,
        penalty_starts(maturity, grace_days),
        now,
    )
}

pub fn check_application(
    policy: &LoanPolicy,
    amount: Decimal,
    has_collateral: bool,
) -> Result<(), LoanError> {
    if amount < policy.min_loan_amount || amount > policy.max_loan_amount {
        return Err(LoanError::AmountOutOfRange {
            min: policy.min_loan_amount,
            max: policy.max_loan_amount,
        });
    }

    if policy.requires_collateral && !has_collateral {
        return Err(LoanError::CollateralRequired);
    }

    Ok(())
}

/// Terms copied onto a loan when it is disbursed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanTerms {
    pub principal: Decimal,
    pub annual_rate: Decimal,
    pub start: DateTime<Utc>,
    pub maturity: DateTime<Utc>,
    pub grace_days: u32,
}

/// Penalty already brought onto the loan and when that last happened.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PenaltyAccrual {
    pub amount: Decimal,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoanStatement {
    pub principal: Decimal,
    pub interest: Decimal,
    pub penalty: Decimal,
    pub paid: Decimal,
    pub outstanding: Decimal,
    pub overdue: bool,
}

/// Interest accrues until maturity. Once the grace period has run out the
/// penalty rate applies to the balance left at the last accrual, for the days
/// since then. Penalty accrued earlier is kept as is.
pub fn statement(
    terms: &LoanTerms,
    paid: Decimal,
    accrued: PenaltyAccrual,
    penalty_rate: Option<Decimal>,
    now: DateTime<Utc>,
) -> LoanStatement {
    let interest = accrued_interest(
        terms.principal,
        terms.annual_rate,
        terms.start,
        now.min(terms.maturity),
    );

    let overdue = is_overdue(terms.maturity, terms.grace_days, now);
    let balance = terms.principal + interest + accrued.amount - paid;
    let penalty = match penalty_rate {
        Some(rate) if overdue && balance > Decimal::ZERO => {
            let starts = penalty_starts(terms.maturity, terms.grace_days);
            let from = accrued.at.map_or(starts, |at| at.max(starts));

            accrued.amount + accrued_interest(balance, rate, from, now)
        }
        _ => accrued.amount,
    };

    let outstanding = (terms.principal + interest + penalty - paid).max(Decimal::ZERO);

    LoanStatement {
        principal: terms.principal,
        interest,
        penalty,
        paid,
        outstanding,
        overdue,
    }
}

/// How one repayment is booked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PaymentSplit {
    pub penalty: Paisa,
    pub interest: Paisa,
    pub principal: Paisa,
}

/// Settles unpaid penalty first, then interest, and books the rest against
/// the principal.
pub fn allocate_payment(amount: Paisa, penalty_due: Paisa, interest_due: Paisa) -> PaymentSplit {
    let penalty = amount.0.min(penalty_due.0.max(0));
    let interest = (amount.0 - penalty).min(interest_due.0.max(0));

    PaymentSplit {
        penalty: Paisa(penalty),
        interest: Paisa(interest),
        principal: Paisa(amount.0 - penalty - interest),
    }
}
