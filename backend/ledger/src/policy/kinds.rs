use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Policy, PolicyHeader, PolicyKind};
use crate::error::PolicyError;

const DEFAULT_LOAN_TERM_DAYS: u32 = 365;

text_enum! {
    pub enum DepositScheduleType {
        MonthlyFixedDay => "monthly_fixed_day",
        Occasional => "occasional",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositPolicy {
    #[serde(flatten)]
    pub header: PolicyHeader,
    pub amount_paisa: i64,
    /// Percent of the amount due charged once a deposit is late.
    pub late_deposit_fine: Decimal,
    #[serde(default = "default_schedule_type")]
    pub schedule_type: DepositScheduleType,
    #[serde(default)]
    pub due_day_of_month: Option<u32>,
    #[serde(default)]
    pub allowed_months: Option<u32>,
    #[serde(default)]
    pub max_occurrences: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanPolicy {
    #[serde(flatten)]
    pub header: PolicyHeader,
    pub max_loan_amount: Decimal,
    pub min_loan_amount: Decimal,
    /// Annual percent.
    pub interest_rate: Decimal,
    pub grace_period_days: u32,
    #[serde(default)]
    pub max_renewals: Option<u32>,
    #[serde(default)]
    pub requires_collateral: bool,
    #[serde(default = "default_term_days")]
    pub term_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestPolicy {
    #[serde(flatten)]
    pub header: PolicyHeader,
    #[serde(default = "default_standard_rate")]
    pub standard_interest_rate: Decimal,
    #[serde(default = "default_penalty_rate")]
    pub penalty_interest_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentPolicy {
    #[serde(flatten)]
    pub header: PolicyHeader,
    pub investment_assigned_to: String,
    pub investing_asset_type: String,
    pub investment_threshold_amount: Decimal,
    pub expected_return_rate: Decimal,
    pub investment_duration_days: u32,
    #[serde(default)]
    pub reinvestment_option: bool,
    #[serde(default)]
    pub max_investment_per_user: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyPolicy {
    #[serde(flatten)]
    pub header: PolicyHeader,
    #[serde(default)]
    pub late_payment_fee: Decimal,
    #[serde(default)]
    pub late_deposit_penalty: Decimal,
    #[serde(default)]
    pub penalty_grace_period_days: u32,
}

fn default_schedule_type() -> DepositScheduleType {
    DepositScheduleType::MonthlyFixedDay
}

fn default_term_days() -> u32 {
    DEFAULT_LOAN_TERM_DAYS
}

fn default_standard_rate() -> Decimal {
    Decimal::ONE
}

fn default_penalty_rate() -> Decimal {
    Decimal::TWO
}

fn ensure(condition: bool, message: &str) -> Result<(), PolicyError> {
    if condition {
        Ok(())
    } else {
        Err(PolicyError::Invalid(message.to_string()))
    }
}

fn minimum_rate() -> Decimal {
    Decimal::new(1, 1)
}

impl Policy for DepositPolicy {
    const KIND: PolicyKind = PolicyKind::Deposit;

    fn header(&self) -> &PolicyHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut PolicyHeader {
        &mut self.header
    }

    fn validate_fields(&self) -> Result<(), PolicyError> {
        ensure(self.amount_paisa > 0, "amount_paisa must be positive")?;
        ensure(
            !self.late_deposit_fine.is_sign_negative(),
            "late_deposit_fine cannot be negative",
        )?;

        match self.schedule_type {
            DepositScheduleType::MonthlyFixedDay => ensure(
                self.due_day_of_month.is_some_and(|day| (1..=31).contains(&day)),
                "due_day_of_month between 1 and 31 is required for monthly_fixed_day",
            )?,
            DepositScheduleType::Occasional => ensure(
                self.allowed_months.is_some_and(|months| months >= 1),
                "allowed_months of at least 1 is required for occasional",
            )?,
        }

        ensure(
            self.max_occurrences.is_none_or(|occurrences| occurrences >= 1),
            "max_occurrences must be at least 1",
        )
    }
}

impl Policy for LoanPolicy {
    const KIND: PolicyKind = PolicyKind::Loan;

    fn header(&self) -> &PolicyHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut PolicyHeader {
        &mut self.header
    }

    fn validate_fields(&self) -> Result<(), PolicyError> {
        ensure(
            !self.min_loan_amount.is_sign_negative(),
            "min_loan_amount cannot be negative",
        )?;
        ensure(
            self.min_loan_amount <= self.max_loan_amount,
            "min_loan_amount cannot exceed max_loan_amount",
        )?;
        ensure(
            self.max_loan_amount.scale() <= 2 && self.min_loan_amount.scale() <= 2,
            "loan amounts have at most two decimal places",
        )?;
        ensure(
            !self.interest_rate.is_sign_negative(),
            "interest_rate cannot be negative",
        )?;
        ensure(self.term_days >= 1, "term_days must be at least 1")
    }
}

impl Policy for InterestPolicy {
    const KIND: PolicyKind = PolicyKind::Interest;

    fn header(&self) -> &PolicyHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut PolicyHeader {
        &mut self.header
    }

    fn validate_fields(&self) -> Result<(), PolicyError> {
        ensure(
            self.standard_interest_rate >= minimum_rate(),
            "standard_interest_rate must be at least 0.1",
        )?;
        ensure(
            self.penalty_interest_rate >= minimum_rate(),
            "penalty_interest_rate must be at least 0.1",
        )
    }
}

impl Policy for InvestmentPolicy {
    const KIND: PolicyKind = PolicyKind::Investment;

    fn header(&self) -> &PolicyHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut PolicyHeader {
        &mut self.header
    }

    fn validate_fields(&self) -> Result<(), PolicyError> {
        ensure(
            !self.investment_assigned_to.trim().is_empty(),
            "investment_assigned_to is required",
        )?;
        ensure(
            !self.investing_asset_type.trim().is_empty(),
            "investing_asset_type is required",
        )?;
        ensure(
            self.investment_threshold_amount >= minimum_rate(),
            "investment_threshold_amount must be at least 0.1",
        )?;
        ensure(
            self.expected_return_rate >= minimum_rate(),
            "expected_return_rate must be at least 0.1",
        )?;
        ensure(
            self.investment_duration_days >= 1,
            "investment_duration_days must be at least 1",
        )?;
        ensure(
            self.max_investment_per_user
                .is_none_or(|amount| amount >= minimum_rate()),
            "max_investment_per_user must be at least 0.1",
        )
    }
}

impl Policy for PenaltyPolicy {
    const KIND: PolicyKind = PolicyKind::Penalty;

    fn header(&self) -> &PolicyHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut PolicyHeader {
        &mut self.header
    }

    fn validate_fields(&self) -> Result<(), PolicyError> {
        ensure(
            !self.late_payment_fee.is_sign_negative(),
            "late_payment_fee cannot be negative",
        )?;
        ensure(
            !self.late_deposit_penalty.is_sign_negative(),
            "late_deposit_penalty cannot be negative",
        )
    }
}
