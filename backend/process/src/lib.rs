//! # Offline tools
//!
//! Maintenance commands that work on the database file directly, without a
//! running server.
//!
//! ## Commands
//! - `create-admin`: bootstrap an admin account.
//! - `extract-receipts`: run receipt extraction over Tesseract TSV files, the
//!   same code the OCR jobs use.
//! - `replay` / `audit`: rebuild policies from their change logs and compare
//!   with the stored documents. A mismatch means the log or the row was edited
//!   outside the application.
use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ledger::receipt::{ReceiptDetails, extract_from_tsv};
use serde::Serialize;
use uuid::Uuid;
use yugantar_server::{
    database::Database,
    services::{
        policy::{PolicyService, ReplayReport},
        users::ensure_superuser,
    },
};

#[derive(Debug, Serialize)]
pub struct ExtractedReceipt {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ReceiptDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuditSummary {
    pub checked: usize,
    pub mismatched: Vec<ReplayReport>,
}

fn progress_bar(length: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(length as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    Ok(pb)
}

/// Returns `false` when the account already existed.
pub fn create_admin(database: &Database, email: &str, password: &str, rounds: u32) -> Result<bool> {
    Ok(ensure_superuser(database, email, password, rounds)?.is_some())
}

fn extract_file(file: &PathBuf) -> Result<ReceiptDetails> {
    let tsv = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;

    Ok(extract_from_tsv(&tsv)?)
}

/// Files that cannot be read or parsed are reported, not fatal.
pub fn extract_receipts(files: &[PathBuf]) -> Vec<ExtractedReceipt> {
    let pb = progress_bar(files.len()).ok();

    let receipts = files
        .iter()
        .map(|file| {
            if let Some(pb) = &pb {
                pb.set_message(format!("Extracting {}", file.display()));
            }

            let extracted = match extract_file(file) {
                Ok(details) => ExtractedReceipt {
                    file: file.display().to_string(),
                    details: Some(details),
                    error: None,
                },
                Err(e) => ExtractedReceipt {
                    file: file.display().to_string(),
                    details: None,
                    error: Some(format!("{e:#}")),
                },
            };

            if let Some(pb) = &pb {
                pb.inc(1);
            }

            extracted
        })
        .collect();

    if let Some(pb) = pb {
        pb.finish_with_message("Done");
    }

    receipts
}

pub fn replay(database: &Database, policy_id: Uuid) -> Result<ReplayReport> {
    Ok(PolicyService::new(database.clone()).replay(policy_id)?)
}

pub fn audit(database: &Database) -> Result<AuditSummary> {
    let reports = PolicyService::new(database.clone()).audit()?;
    let pb = progress_bar(reports.len())?;

    let mut mismatched = Vec::new();
    for report in &reports {
        pb.set_message(format!("Checking {}", report.policy_id));
        if !report.matches {
            mismatched.push(report.clone());
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done");

    Ok(AuditSummary {
        checked: reports.len(),
        mismatched,
    })
}

#[cfg(test)]
mod tests {
    use ledger::{ClientMeta, Policy, policy::InterestPolicy};
    use serde_json::Map;
    use tempfile::TempDir;

    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn database(dir: &TempDir) -> Database {
        let path = dir.path().join("yugantar.db");
        Database::open(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_create_admin_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let database = database(&dir);

        assert!(create_admin(&database, "root@example.com", "supersecret", 1000).unwrap());
        assert!(!create_admin(&database, "root@example.com", "supersecret", 1000).unwrap());
    }

    #[test]
    fn test_extract_receipts_reports_bad_files() {
        let dir = TempDir::new().unwrap();

        let good = dir.path().join("good.tsv");
        fs::write(
            &good,
            format!(
                "{HEADER}\n5\t1\t1\t1\t1\t0\t10\t40\t40\t12\t95\tAmount\n5\t1\t1\t1\t1\t1\t60\t41\t40\t12\t95\t1,500.00"
            ),
        )
        .unwrap();
        let missing = dir.path().join("missing.tsv");

        let receipts = extract_receipts(&[good, missing]);

        assert_eq!(receipts.len(), 2);
        assert!(receipts[0].error.is_none());
        assert!(receipts[0].details.as_ref().is_some_and(|details| details.amount.is_some()));
        assert!(receipts[1].details.is_none());
        assert!(receipts[1].error.is_some());
    }

    #[test]
    fn test_audit_on_a_fresh_database() {
        let dir = TempDir::new().unwrap();
        let database = database(&dir);

        let service = PolicyService::new(database.clone());
        let meta = ClientMeta::default();
        let policy: InterestPolicy = service
            .create(&Map::new(), "admin@example.com", None, &meta)
            .unwrap();
        service
            .submit::<InterestPolicy>(policy.id(), "admin@example.com", &meta)
            .unwrap();

        let summary = audit(&database).unwrap();
        assert_eq!(summary.checked, 1);
        assert!(summary.mismatched.is_empty());

        let report = replay(&database, policy.id()).unwrap();
        assert!(report.matches);
        assert_eq!(report.stored_version, Some(2));
    }
}
