//! # OCR jobs
//!
//! Receipt extraction runs off the request path. A job is created `pending`,
//! moves to `in_progress` when a blocking worker picks it up and ends as
//! `completed` or `failed`. Finished jobs are kept for an hour so the client
//! can poll for the result, then pruned.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use ledger::receipt::{ReceiptDetails, extract_from_tsv};
use serde::Serialize;
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;

pub const JOB_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed { result: ReceiptDetails },
    Failed { message: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}

struct Job {
    owner: Uuid,
    status: JobStatus,
    finished_at: Option<Instant>,
}

#[derive(Clone, Default)]
pub struct OcrJobs {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
}

impl OcrJobs {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Job>>, AppError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| AppError::Internal("ocr job lock poisoned".into()))?;

        jobs.retain(|_, job| {
            job.finished_at
                .is_none_or(|finished| finished.elapsed() < JOB_RETENTION)
        });

        Ok(jobs)
    }

    fn set(&self, id: Uuid, status: JobStatus) {
        let Ok(mut jobs) = self.lock() else {
            return;
        };

        if let Some(job) = jobs.get_mut(&id) {
            if status.is_finished() {
                job.finished_at = Some(Instant::now());
            }
            job.status = status;
        }
    }

    /// Queues extraction of a Tesseract TSV dump and returns the job id.
    pub fn submit(&self, owner: Uuid, tsv: String) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        self.lock()?.insert(
            id,
            Job {
                owner,
                status: JobStatus::Pending,
                finished_at: None,
            },
        );

        let jobs = self.clone();
        tokio::spawn(async move {
            jobs.set(id, JobStatus::InProgress);

            let status = match task::spawn_blocking(move || extract_from_tsv(&tsv)).await {
                Ok(Ok(result)) => {
                    info!(job = %id, "Receipt extracted");
                    JobStatus::Completed { result }
                }
                Ok(Err(e)) => {
                    warn!(job = %id, "Receipt extraction failed: {e}");
                    JobStatus::Failed {
                        message: e.to_string(),
                    }
                }
                Err(e) => {
                    warn!(job = %id, "Receipt worker crashed: {e}");
                    JobStatus::Failed {
                        message: "OCR processing failed".to_string(),
                    }
                }
            };

            jobs.set(id, status);
        });

        Ok(id)
    }

    /// Status of a job owned by `owner`.
    pub fn status(&self, owner: Uuid, id: Uuid) -> Result<JobStatus, AppError> {
        self.lock()?
            .get(&id)
            .filter(|job| job.owner == owner)
            .map(|job| job.status.clone())
            .ok_or(AppError::NotFound("OCR job"))
    }

    pub fn remove(&self, owner: Uuid, id: Uuid) -> Result<(), AppError> {
        let mut jobs = self.lock()?;

        match jobs.get(&id) {
            Some(job) if job.owner == owner => {
                if !job.status.is_finished() {
                    return Err(AppError::BadRequest(
                        "Only completed or failed jobs can be deleted".into(),
                    ));
                }
                jobs.remove(&id);
                Ok(())
            }
            _ => Err(AppError::NotFound("OCR job")),
        }
    }
}
