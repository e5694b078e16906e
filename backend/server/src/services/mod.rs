//! Operations that span several tables. Handlers stay thin and call into these,
//! and so does the `process` CLI.
pub mod deposits;
pub mod loans;
pub mod policy;
pub mod users;
