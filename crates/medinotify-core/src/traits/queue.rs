//! Delayed job queue trait.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::job::{Job, JobOptions, JobPayload, JobState};

/// Delayed-job queue capability consumed by the dispatcher and the worker.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job. If `job_id` is already known (live or retained), the existing
    /// job is returned unchanged.
    async fn add(&self, job_id: &str, payload: JobPayload, options: JobOptions) -> Result<Job>;

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>>;

    /// Jobs currently in any of `states`.
    async fn get_jobs(&self, states: &[JobState]) -> Result<Vec<Job>>;

    /// Remove a waiting or delayed job. Active jobs cannot be removed.
    /// Returns true if the job was removed.
    async fn remove(&self, job_id: &str) -> Result<bool>;

    /// Outstanding job ids linked to a notification, via the secondary index.
    async fn job_ids_for_notification(&self, notification_id: &str) -> Result<Vec<String>>;

    /// Wait for the next job that is due and mark it active.
    async fn next_ready(&self) -> Result<Job>;

    async fn complete(&self, job_id: &str) -> Result<()>;

    /// Put an active job back, eligible again after `delay`.
    async fn retry(&self, job_id: &str, delay: Duration, reason: &str) -> Result<()>;

    /// Move an active job to failed.
    async fn fail(&self, job_id: &str, reason: &str) -> Result<()>;
}
