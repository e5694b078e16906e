//! Status transitions. Each one is guarded by the current status.
use chrono::{DateTime, Utc};

use super::{Policy, PolicyStatus};
use crate::error::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Submit,
    Approve,
    Reject,
    Deactivate,
    Expire,
}

impl Transition {
    pub fn action(self) -> &'static str {
        match self {
            Transition::Submit => "submit",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Deactivate => "deactivate",
            Transition::Expire => "expire",
        }
    }

    pub fn target(self, from: PolicyStatus) -> Result<PolicyStatus, PolicyError> {
        use PolicyStatus::*;

        let to = match (self, from) {
            (Transition::Submit, Draft) => Finalized,
            (Transition::Approve, Finalized) => Active,
            (Transition::Reject, Finalized) => Void,
            (Transition::Deactivate, Draft | Finalized) => Void,
            (Transition::Deactivate, Active) => Expired,
            (Transition::Expire, Active) => Expired,
            _ => {
                return Err(PolicyError::InvalidTransition {
                    action: self.action(),
                    status: from,
                });
            }
        };

        Ok(to)
    }
}

/// Returns the policy moved through `transition`. Version bookkeeping is left
/// to the caller.
pub fn apply<P: Policy>(
    policy: &P,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<P, PolicyError> {
    let status = transition.target(policy.status())?;

    if transition == Transition::Expire
        && policy.header().effective_to.is_none_or(|to| to > now)
    {
        return Err(PolicyError::InvalidTransition {
            action: transition.action(),
            status: policy.status(),
        });
    }

    let mut next = policy.clone();
    let header = next.header_mut();
    header.status = status;
    header.is_active = status == PolicyStatus::Active;

    if status.is_terminal() && header.effective_to.is_none_or(|to| to > now) {
        header.effective_to = Some(now);
    }

    Ok(next)
}

/// Field edits are only allowed on drafts.
pub fn ensure_editable<P: Policy>(policy: &P) -> Result<(), PolicyError> {
    if policy.status() != PolicyStatus::Draft {
        return Err(PolicyError::InvalidTransition {
            action: "edit",
            status: policy.status(),
        });
    }

    Ok(())
}
