//! Job dispatcher: deterministic job identity, dispatch policy, and
//! cancellation of every outstanding job linked to a notification.

use std::sync::Arc;
use std::time::Duration;

use medinotify_core::config::QueueConfig;
use medinotify_core::{BackoffPolicy, JobOptions, JobPayload, JobQueue, NotifyError, Result};

/// Prefix of every job id built by the dispatcher.
pub const JOB_ID_PREFIX: &str = "notification-";

/// `notification-{notification_id}-{token}`.
pub fn job_id_for(notification_id: &str, idempotency_token: &str) -> String {
    format!("{JOB_ID_PREFIX}{notification_id}-{idempotency_token}")
}

/// Inverse of [`job_id_for`]. Notification ids may contain dashes; the token may not.
pub fn notification_id_from_job_id(job_id: &str) -> Option<&str> {
    let rest = job_id.strip_prefix(JOB_ID_PREFIX)?;
    let (id, token) = rest.rsplit_once('-')?;
    (!id.is_empty() && !token.is_empty()).then_some(id)
}

/// Attempts and backoff applied to every enqueued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for DispatchPolicy {
    /// Three attempts, exponential backoff from 5 seconds.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::Exponential { base_ms: 5_000 },
        }
    }
}

impl From<&QueueConfig> for DispatchPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff(),
        }
    }
}

/// Wraps the delayed job queue with the notification-specific conventions.
#[derive(Clone)]
pub struct JobDispatcher {
    queue: Arc<dyn JobQueue>,
    policy: DispatchPolicy,
}

impl JobDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, policy: DispatchPolicy) -> Self {
        Self { queue, policy }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Enqueue one delivery. Repeating the call with the same
    /// `(notification_id, idempotency_token)` yields the same job id, and the
    /// queue collapses it onto the existing job.
    pub async fn enqueue(
        &self,
        notification_id: &str,
        payload: JobPayload,
        delay: Duration,
        idempotency_token: &str,
    ) -> Result<String> {
        let job_id = job_id_for(notification_id, idempotency_token);
        let options = JobOptions {
            delay,
            attempts: self.policy.max_attempts,
            backoff: self.policy.backoff,
        };
        let job = self
            .queue
            .add(&job_id, payload, options)
            .await
            .map_err(|e| NotifyError::Dispatch {
                id: notification_id.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(
            "📬 Enqueued {} for notification {} (delay {}ms)",
            job.id,
            notification_id,
            delay.as_millis()
        );
        Ok(job.id)
    }

    /// Remove every active/waiting/delayed job linked to `notification_id`.
    ///
    /// Zero matches is not an error: the notification may already have fired
    /// or never been queued. Jobs already in flight are left alone and not counted.
    pub async fn find_and_remove_by_notification_id(&self, notification_id: &str) -> Result<usize> {
        let job_ids = self.queue.job_ids_for_notification(notification_id).await?;
        let mut removed = 0;
        for job_id in &job_ids {
            if self.queue.remove(job_id).await? {
                removed += 1;
            } else {
                tracing::info!("⏳ Job {job_id} is already being delivered, not removed");
            }
        }
        tracing::debug!(
            "🧹 Removed {removed}/{} job(s) for notification {notification_id}",
            job_ids.len()
        );
        Ok(removed)
    }
}
