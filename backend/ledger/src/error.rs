use rust_decimal::Decimal;
use thiserror::Error;

use crate::policy::PolicyStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid policy: {0}")]
    Invalid(String),

    #[error("Cannot {action} a policy in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: PolicyStatus,
    },

    #[error("Field {0} is read-only")]
    ReadOnlyField(String),

    #[error("Unknown policy field: {0}")]
    UnknownField(String),

    #[error("Malformed policy document: {0}")]
    Document(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Change history is empty")]
    Empty,

    #[error("Change history must start with a created entry at version 1")]
    MissingCreated,

    #[error("Version gap: expected version {expected}, found {found}")]
    VersionGap { expected: u32, found: u32 },

    #[error("Snapshot before version {version} does not match the replayed state")]
    SnapshotMismatch { version: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("due_day_of_month must be set for the monthly_fixed_day schedule")]
    MissingDueDay,

    #[error("allowed_months must be set for the occasional schedule")]
    MissingAllowedMonths,

    #[error("Due date is out of range")]
    OutOfRange,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoanError {
    #[error("Loan amount must be between {min} and {max}")]
    AmountOutOfRange { min: Decimal, max: Decimal },

    #[error("This loan policy requires collateral")]
    CollateralRequired,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("TSV header is missing the {0} column")]
    MissingColumn(&'static str),

    #[error("Malformed TSV on line {line}")]
    MalformedLine { line: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Loan(#[from] LoanError),

    #[error(transparent)]
    Receipt(#[from] ReceiptError),
}
