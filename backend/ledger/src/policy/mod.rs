//! # Policies
//!
//! A policy is a versioned JSON document: a shared [`PolicyHeader`] flattened
//! next to the fields of one concrete kind (see [`kinds`]).
//!
//! ## Lifecycle
//!
//! ```text
//! draft --submit--> finalized --approve--> active --deactivate/expire--> expired
//!   |                   |
//!   |                   +--reject/deactivate--> void
//!   +--deactivate--> void
//! ```
//!
//! Fields can only be edited while the policy is a draft. `void` and `expired`
//! are terminal. `is_active` mirrors `status == active`.
pub mod audit;
pub mod diff;
pub mod kinds;
pub mod workflow;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::error::PolicyError;

pub use audit::{ChangeContext, ChangeType, ClientMeta, FieldChange, PolicyChangeLog, replay};
pub use diff::{Changes, Snapshot, apply_patch, classify, diff, from_draft, from_snapshot, snapshot};
pub use kinds::{
    DepositPolicy, DepositScheduleType, InterestPolicy, InvestmentPolicy, LoanPolicy,
    PenaltyPolicy,
};
pub use workflow::Transition;

text_enum! {
    pub enum PolicyKind {
        Deposit => "deposit",
        Loan => "loan",
        Interest => "interest",
        Investment => "investment",
        Penalty => "penalty",
    }
}

impl PolicyKind {
    /// Name recorded as `policy_type` on change logs and notifications.
    pub fn type_name(self) -> &'static str {
        match self {
            PolicyKind::Deposit => "DepositPolicy",
            PolicyKind::Loan => "LoanPolicy",
            PolicyKind::Interest => "InterestPolicy",
            PolicyKind::Investment => "InvestmentPolicy",
            PolicyKind::Penalty => "PenaltyPolicy",
        }
    }
}

text_enum! {
    pub enum PolicyStatus {
        Draft => "draft",
        Finalized => "finalized",
        Active => "active",
        Void => "void",
        Expired => "expired",
    }
}

impl PolicyStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PolicyStatus::Void | PolicyStatus::Expired)
    }
}

/// Header fields shared by every policy kind.
pub const HEADER_FIELDS: [&str; 10] = [
    "policy_id",
    "version",
    "status",
    "is_active",
    "effective_from",
    "effective_to",
    "created_by",
    "created_at",
    "updated_by",
    "updated_at",
];

/// Header fields a client may set when creating or editing a draft.
pub const EDITABLE_HEADER_FIELDS: [&str; 2] = ["effective_from", "effective_to"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyHeader {
    pub policy_id: Uuid,
    pub version: u32,
    pub status: PolicyStatus,
    pub is_active: bool,
    pub effective_from: DateTime<Utc>,
    #[serde(default)]
    pub effective_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PolicyHeader {
    /// Header of a brand new draft at version 1.
    pub fn draft(created_by: &str, now: DateTime<Utc>) -> Self {
        Self {
            policy_id: Uuid::new_v4(),
            version: 1,
            status: PolicyStatus::Draft,
            is_active: false,
            effective_from: now,
            effective_to: None,
            created_by: Some(created_by.to_string()),
            created_at: now,
            updated_by: None,
            updated_at: None,
        }
    }

    /// Marks one more revision by `actor`.
    pub fn touch(&mut self, actor: &str, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_by = Some(actor.to_string());
        self.updated_at = Some(now);
    }

    pub fn truncate_timestamps(&mut self) {
        self.effective_from = self.effective_from.trunc_subsecs(0);
        self.effective_to = self.effective_to.map(|at| at.trunc_subsecs(0));
        self.created_at = self.created_at.trunc_subsecs(0);
        self.updated_at = self.updated_at.map(|at| at.trunc_subsecs(0));
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version < 1 {
            return Err(PolicyError::Invalid("version must be at least 1".into()));
        }

        if self.is_active != (self.status == PolicyStatus::Active) {
            return Err(PolicyError::Invalid(
                "is_active must match the active status".into(),
            ));
        }

        if let Some(effective_to) = self.effective_to {
            if effective_to <= self.effective_from && !self.status.is_terminal() {
                return Err(PolicyError::Invalid(
                    "effective_to must be after effective_from".into(),
                ));
            }
        }

        Ok(())
    }

    /// Whether `now` falls inside the effective window.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.effective_from <= now && self.effective_to.is_none_or(|to| now < to)
    }
}

/// A concrete policy document.
pub trait Policy: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: PolicyKind;

    fn header(&self) -> &PolicyHeader;

    fn header_mut(&mut self) -> &mut PolicyHeader;

    /// Checks the kind specific fields. The header is checked by [`Policy::check`].
    fn validate_fields(&self) -> Result<(), PolicyError>;

    fn check(&self) -> Result<(), PolicyError> {
        self.header().validate()?;
        self.validate_fields()
    }

    fn id(&self) -> Uuid {
        self.header().policy_id
    }

    fn version(&self) -> u32 {
        self.header().version
    }

    fn status(&self) -> PolicyStatus {
        self.header().status
    }
}
