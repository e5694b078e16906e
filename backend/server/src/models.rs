use chrono::{DateTime, Utc};
use ledger::{
    Paisa,
    loan::{LoanTerms, PenaltyAccrual},
    schedule::DepositTiming,
    text_enum,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

text_enum! {
    pub enum AccessRole {
        User => "user",
        Moderator => "moderator",
        Admin => "admin",
    }
}

text_enum! {
    pub enum CooperativeRole {
        Member => "member",
        Secretary => "secretary",
        Treasurer => "treasurer",
        President => "president",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[serde(skip)]
    pub password_hash: String,
    pub access_roles: Vec<AccessRole>,
    pub cooperative_roles: Vec<CooperativeRole>,
    pub disabled: bool,
    pub is_verified: bool,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_role(&self, role: AccessRole) -> bool {
        self.access_roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(AccessRole::Admin)
    }

    pub fn is_staff(&self) -> bool {
        self.is_admin() || self.has_role(AccessRole::Moderator)
    }

    pub fn full_name(&self) -> String {
        match &self.middle_name {
            Some(middle) => format!("{} {} {}", self.first_name, middle, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

text_enum! {
    pub enum Verification {
        Pending => "pending",
        Verified => "verified",
        Rejected => "rejected",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub policy_id: Uuid,
    pub amount_paisa: Paisa,
    pub amount_due_paisa: Paisa,
    pub deposited_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub timing: DepositTiming,
    pub verification: Verification,
    pub verified_by: Option<String>,
    pub receipt_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

text_enum! {
    pub enum FineType {
        LateDeposit => "late_deposit",
        LateLoanPayment => "late_loan_payment",
        Other => "other",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Fine {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deposit_id: Option<Uuid>,
    pub loan_id: Option<Uuid>,
    pub amount_paisa: Paisa,
    pub fine_type: FineType,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

text_enum! {
    pub enum LoanStatus {
        Pending => "pending",
        Rejected => "rejected",
        Active => "active",
        Paid => "paid",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Loan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub policy_id: Uuid,
    pub principal_paisa: Paisa,
    pub interest_rate: Decimal,
    pub grace_period_days: u32,
    pub term_days: u32,
    pub max_renewals: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub maturity_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub approved_by: Option<String>,
    pub total_paid_paisa: Paisa,
    /// Penalty brought onto the loan so far. Every paisa of it has been fined.
    pub penalty_accrued_paisa: Paisa,
    pub penalty_accrued_at: Option<DateTime<Utc>>,
    pub renewals: u32,
    pub collateral: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// `None` until the loan has been disbursed.
    pub fn terms(&self) -> Option<LoanTerms> {
        Some(LoanTerms {
            principal: self.principal_paisa.to_rupees(),
            annual_rate: self.interest_rate,
            start: self.start_date?,
            maturity: self.maturity_date?,
            grace_days: self.grace_period_days,
        })
    }

    pub fn accrual(&self) -> PenaltyAccrual {
        PenaltyAccrual {
            amount: self.penalty_accrued_paisa.to_rupees(),
            at: self.penalty_accrued_at,
        }
    }
}

/// One repayment, split the way it was booked.
#[derive(Debug, Clone, Serialize)]
pub struct LoanPayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub receipt_id: Option<Uuid>,
    pub amount_paisa: Paisa,
    pub principal_paisa: Paisa,
    pub interest_paisa: Paisa,
    pub penalty_paisa: Paisa,
    pub recorded_by: String,
    pub paid_at: DateTime<Utc>,
}

text_enum! {
    pub enum NotificationType {
        PolicyApproval => "policy_approval",
        PolicyApproved => "policy_approved",
        PolicyRejected => "policy_rejected",
        PolicyFinalized => "policy_finalized",
        General => "general",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub policy_id: Option<Uuid>,
    pub policy_type: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            message: message.into(),
            notification_type,
            policy_id: None,
            policy_type: None,
            is_read: false,
            created_at: ledger::now(),
        }
    }

    pub fn about_policy(mut self, policy_id: Uuid, policy_type: &str) -> Self {
        self.policy_id = Some(policy_id);
        self.policy_type = Some(policy_type.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deposit_id: Option<Uuid>,
    pub amount_paisa: Paisa,
    pub charge_paisa: Option<Paisa>,
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
