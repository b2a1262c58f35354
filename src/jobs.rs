//! Per-upload progress records.
//!
//! One record per accepted upload, created before the background task is
//! spawned so a status poll can never miss it. Updates write only the
//! provided fields; the orchestrator is the sole writer, so last-write-wins
//! is safe.

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::models::{Job, JobStatus};
use crate::storage::{JobUpdate, Store};

#[derive(Clone)]
pub struct JobManager {
    store: Arc<Store>,
}

impl JobManager {
    pub fn new(store: Arc<Store>) -> JobManager {
        JobManager { store }
    }

    /// Persist a fresh `processing` record and return its id.
    pub async fn create(&self, total: usize) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        self.store.create_job(&job_id, total).await?;
        Ok(job_id)
    }

    /// Record one more finished file slot.
    pub async fn advance(&self, job_id: &str, completed: usize) -> Result<()> {
        self.store
            .update_job(
                job_id,
                JobUpdate {
                    completed: Some(completed),
                    ..JobUpdate::default()
                },
            )
            .await
    }

    /// Transition to a terminal state. `completed` reflects consumed slots,
    /// including a failed one.
    pub async fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        completed: usize,
        last_error: Option<String>,
    ) -> Result<()> {
        self.store
            .update_job(
                job_id,
                JobUpdate {
                    completed: Some(completed),
                    status: Some(status),
                    last_error,
                },
            )
            .await
    }

    /// `None` for unknown ids; the HTTP layer turns that into a 404.
    pub async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        self.store.get_job(job_id).await
    }
}
