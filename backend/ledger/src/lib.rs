//! # Ledger
//!
//! Pure domain logic shared by the server and the operator CLI. Nothing in here
//! touches the network or the database.
//!
//! ## Modules
//!
//! - [`money`]: paisa/rupee conversion and NPR formatting.
//! - [`policy`]: the versioned policy documents, their approval workflow and the
//!   change-log engine (snapshot, diff, classify, replay).
//! - [`schedule`]: deposit due dates and late fines.
//! - [`loan`]: maturity, simple interest and overdue penalties.
//! - [`receipt`]: field extraction from Tesseract word data.
//!
//! ## Change log
//!
//! Every mutation of a policy produces exactly one [`policy::PolicyChangeLog`].
//! A log stores the snapshot before, the snapshot after and a field level diff
//! between the two. Replaying the diffs in version order from the `created` entry
//! has to land on the stored document, which is what [`policy::replay`] checks.
//!
//! ```text
//! v1 created    before: null        after: {..}       changes: every field
//! v2 updated    before: v1 snapshot after: {..}       changes: edited fields
//! v3 activated  before: v2 snapshot after: {..}       changes: status, is_active, ...
//! ```
//!
//! All timestamps are UTC and truncated to whole seconds before they are stored,
//! so snapshots survive a JSON round trip unchanged.
#[macro_use]
mod macros;

pub mod error;
pub mod loan;
pub mod money;
pub mod policy;
pub mod receipt;
pub mod schedule;

pub use error::{
    LedgerError, LoanError, PolicyError, ReceiptError, ReplayError, ScheduleError, UnknownVariant,
};
pub use money::Paisa;
pub use policy::{
    ChangeType, ClientMeta, Policy, PolicyChangeLog, PolicyHeader, PolicyKind, PolicyStatus,
};

use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}
