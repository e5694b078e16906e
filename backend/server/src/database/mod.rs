//! # SQLite
//!
//! Single file database behind one mutex. Every handler holds the lock only for
//! the synchronous work it does, never across an `.await`.
//!
//! ## Tables
//!
//! - `users`: accounts, roles stored as JSON arrays.
//! - `policies`: one row per policy, the whole document in `document` as JSON.
//!   `kind`, `status` and `version` are copied out for filtering and for the
//!   optimistic version check on update.
//! - `policy_change_logs`: append only. Triggers abort any `UPDATE` or `DELETE`,
//!   and `(policy_id, version_after)` is unique.
//! - `deposits`, `fines`, `loans`, `receipts`, `notifications`.
//! - `loan_payments`: one row per repayment with its penalty, interest and
//!   principal parts.
//!
//! Money columns hold whole paisa. Timestamps are UTC text.
use std::{
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
};

use rusqlite::{Connection, Row, Transaction, types::Type};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;

pub mod deposits;
pub mod fines;
pub mod loans;
pub mod notifications;
pub mod policies;
pub mod receipts;
pub mod users;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    middle_name TEXT,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    phone TEXT NOT NULL,
    address TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    access_roles TEXT NOT NULL,
    cooperative_roles TEXT NOT NULL,
    disabled INTEGER NOT NULL DEFAULT 0,
    is_verified INTEGER NOT NULL DEFAULT 0,
    joined_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS policies (
    policy_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    version INTEGER NOT NULL,
    status TEXT NOT NULL,
    effective_from TEXT NOT NULL,
    effective_to TEXT,
    created_by TEXT,
    document TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS policies_kind_status ON policies (kind, status);

CREATE TABLE IF NOT EXISTS policy_change_logs (
    id TEXT PRIMARY KEY,
    policy_id TEXT NOT NULL REFERENCES policies (policy_id),
    policy_type TEXT NOT NULL,
    change_type TEXT NOT NULL,
    version_before INTEGER,
    version_after INTEGER NOT NULL,
    changes TEXT NOT NULL,
    snapshot_before TEXT,
    snapshot_after TEXT NOT NULL,
    changed_by TEXT,
    changed_reason TEXT,
    changed_at TEXT NOT NULL,
    changed_from_ip TEXT,
    user_agent TEXT,
    UNIQUE (policy_id, version_after)
);

CREATE TRIGGER IF NOT EXISTS policy_change_logs_no_update
BEFORE UPDATE ON policy_change_logs
BEGIN
    SELECT RAISE(ABORT, 'policy change logs are immutable');
END;

CREATE TRIGGER IF NOT EXISTS policy_change_logs_no_delete
BEFORE DELETE ON policy_change_logs
BEGIN
    SELECT RAISE(ABORT, 'policy change logs are immutable');
END;

CREATE TABLE IF NOT EXISTS receipts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    deposit_id TEXT,
    amount_paisa INTEGER NOT NULL,
    charge_paisa INTEGER,
    reference TEXT,
    paid_at TEXT,
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deposits (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    policy_id TEXT NOT NULL REFERENCES policies (policy_id),
    amount_paisa INTEGER NOT NULL,
    amount_due_paisa INTEGER NOT NULL,
    deposited_at TEXT NOT NULL,
    due_at TEXT NOT NULL,
    timing TEXT NOT NULL,
    verification TEXT NOT NULL,
    verified_by TEXT,
    receipt_id TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS deposits_user ON deposits (user_id, due_at);

CREATE TABLE IF NOT EXISTS loans (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    policy_id TEXT NOT NULL REFERENCES policies (policy_id),
    principal_paisa INTEGER NOT NULL,
    interest_rate TEXT NOT NULL,
    grace_period_days INTEGER NOT NULL,
    term_days INTEGER NOT NULL,
    max_renewals INTEGER,
    start_date TEXT,
    maturity_date TEXT,
    status TEXT NOT NULL,
    approved_by TEXT,
    total_paid_paisa INTEGER NOT NULL DEFAULT 0,
    penalty_accrued_paisa INTEGER NOT NULL DEFAULT 0,
    penalty_accrued_at TEXT,
    renewals INTEGER NOT NULL DEFAULT 0,
    collateral TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS loan_payments (
    id TEXT PRIMARY KEY,
    loan_id TEXT NOT NULL REFERENCES loans (id) ON DELETE CASCADE,
    receipt_id TEXT REFERENCES receipts (id) ON DELETE SET NULL,
    amount_paisa INTEGER NOT NULL,
    principal_paisa INTEGER NOT NULL,
    interest_paisa INTEGER NOT NULL,
    penalty_paisa INTEGER NOT NULL,
    recorded_by TEXT NOT NULL,
    paid_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS loan_payments_loan ON loan_payments (loan_id, paid_at);

CREATE TABLE IF NOT EXISTS fines (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    deposit_id TEXT REFERENCES deposits (id) ON DELETE SET NULL,
    loan_id TEXT REFERENCES loans (id) ON DELETE SET NULL,
    amount_paisa INTEGER NOT NULL,
    fine_type TEXT NOT NULL,
    reason TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    notification_type TEXT NOT NULL,
    policy_id TEXT,
    policy_type TEXT,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS notifications_user ON notifications (user_id, created_at);
"#;

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at `path`. `:memory:` gives a private
    /// in-memory database.
    pub fn open(path: &str) -> Result<Self, AppError> {
        let connection = Connection::open(path)?;
        connection.pragma_update(None, "foreign_keys", "ON")?;
        connection.execute_batch(SCHEMA)?;

        info!("Database ready at {path}");

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.connection
            .lock()
            .map_err(|_| AppError::Internal("database lock poisoned".into()))
    }

    pub fn read<T>(
        &self,
        query: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let connection = self.lock()?;
        query(&connection)
    }

    /// Runs `work` in one transaction. Any error rolls everything back.
    pub fn write<T>(
        &self,
        work: impl FnOnce(&Transaction<'_>) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut connection = self.lock()?;
        let transaction = connection.transaction()?;

        let value = work(&transaction)?;
        transaction.commit()?;

        Ok(value)
    }
}

fn conversion_error<E>(index: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
}

fn column_index(row: &Row<'_>, column: &str) -> usize {
    row.as_ref().column_index(column).unwrap_or_default()
}

pub(crate) fn get_uuid(row: &Row<'_>, column: &str) -> rusqlite::Result<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(column_index(row, column), e))
}

pub(crate) fn get_optional_uuid(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(column)?;
    text.map(|text| {
        Uuid::parse_str(&text).map_err(|e| conversion_error(column_index(row, column), e))
    })
    .transpose()
}

/// Text column parsed with [`FromStr`], used for enums and decimals.
pub(crate) fn get_parsed<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(column)?;
    text.parse()
        .map_err(|e| conversion_error(column_index(row, column), e))
}

pub(crate) fn get_json<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<T> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(column_index(row, column), e))
}

pub(crate) fn get_optional_json<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(column)?;
    text.map(|text| {
        serde_json::from_str(&text).map_err(|e| conversion_error(column_index(row, column), e))
    })
    .transpose()
}
