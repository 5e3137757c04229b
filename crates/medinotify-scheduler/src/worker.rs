//! Dispatch worker: pulls due jobs off the queue, delivers them, and records
//! the outcome on the notification record.
//!
//! Every job that `next_ready` hands out leaves this module completed, failed
//! or back in the queue, whatever the store does in between.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use medinotify_core::{
    DeliveryTransport, Job, NotificationStore, NotifyError, Result, ScheduleEntry, ScheduleStatus,
};

use crate::delay::delay_until;
use crate::dispatcher::JobDispatcher;

/// Tries for each store or queue write made after a delivery.
const BOOKKEEPING_ATTEMPTS: u32 = 3;

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Sent,
    /// Delivery failed; the job is back in the queue.
    Retrying { delay: Duration },
    /// Delivery failed and no attempts are left.
    Failed,
    /// The notification was cancelled; nothing recorded.
    Orphaned,
}

pub struct DispatchWorker {
    store: Arc<dyn NotificationStore>,
    dispatcher: JobDispatcher,
    transport: Arc<dyn DeliveryTransport>,
}

impl DispatchWorker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        dispatcher: JobDispatcher,
        transport: Arc<dyn DeliveryTransport>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            transport,
        }
    }

    /// Handle one job that the queue has already marked active.
    pub async fn process(&self, job: Job) -> Result<JobOutcome> {
        let queue = self.dispatcher.queue();

        match self.store.find_by_id(&job.notification_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::info!("🗑️ Notification {} is gone, dropping {}", job.notification_id, job.id);
                queue.complete(&job.id).await?;
                return Ok(JobOutcome::Orphaned);
            }
            Err(e) => {
                tracing::warn!("⚠️ Lookup of {} failed: {e}", job.notification_id);
                return self.handle_failure(&job, &e).await;
            }
        }

        let payload = &job.payload;
        match self.transport.send(&payload.recipient, &payload.content).await {
            Ok(()) => {
                queue.complete(&job.id).await?;
                tracing::info!(
                    "✅ [{}] Delivered {} to {}",
                    self.transport.name(),
                    job.notification_id,
                    payload.recipient
                );
                self.finish(&job, ScheduleStatus::Sent).await
            }
            Err(e) => self.handle_failure(&job, &e).await,
        }
    }

    /// Put the job back with backoff, or fail it when attempts are spent or the
    /// error is permanent.
    async fn handle_failure(&self, job: &Job, err: &NotifyError) -> Result<JobOutcome> {
        let queue = self.dispatcher.queue();
        let reason = err.to_string();
        if job.can_retry() && err.is_retryable() {
            let delay = job.backoff.delay_for(job.attempts_made);
            tracing::warn!(
                "⚠️ Attempt {}/{} for {} failed: {reason} (retry in {}ms)",
                job.attempts_made,
                job.max_attempts,
                job.id,
                delay.as_millis()
            );
            queue.retry(&job.id, delay, &reason).await?;
            return Ok(JobOutcome::Retrying { delay });
        }

        tracing::error!(
            "❌ Giving up on {} after {} attempt(s): {reason}",
            job.id,
            job.attempts_made
        );
        queue.fail(&job.id, &reason).await?;
        self.finish(job, ScheduleStatus::Failed).await
    }

    /// Run a store or queue write, retrying retryable errors with the job's backoff.
    async fn with_retries<T, F, Fut>(&self, job: &Job, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < BOOKKEEPING_ATTEMPTS => {
                    let delay = job.backoff.delay_for(attempt);
                    tracing::warn!(
                        "⚠️ {what} for {} failed: {e} (retry in {}ms)",
                        job.id,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Record a terminal outcome, then arm the next occurrence of a recurring notification.
    /// The next occurrence is armed even when the outcome could not be written.
    async fn finish(&self, job: &Job, status: ScheduleStatus) -> Result<JobOutcome> {
        let payload = &job.payload;
        let recorded = self
            .with_retries(job, "Recording outcome", || {
                self.store.record_outcome(
                    &job.notification_id,
                    payload.scheduled_at,
                    payload.priority,
                    status,
                )
            })
            .await;
        let recorded = match recorded {
            Ok(()) => Ok(()),
            Err(NotifyError::NotFound(_)) => {
                tracing::info!("🗑️ Notification {} cancelled mid-delivery", job.notification_id);
                return Ok(JobOutcome::Orphaned);
            }
            Err(e) => {
                tracing::error!(
                    "❌ Could not record {} for {}: {e}",
                    status.as_str(),
                    job.id
                );
                Err(e)
            }
        };

        if payload.frequency.is_some() {
            self.rearm(job, Utc::now()).await?;
        }
        recorded?;

        Ok(match status {
            ScheduleStatus::Failed => JobOutcome::Failed,
            _ => JobOutcome::Sent,
        })
    }

    /// Append a pending entry for the next occurrence and queue it.
    /// Occurrences missed while nothing was running are skipped, not replayed.
    /// If the enqueue keeps failing, the pending entry stays behind for
    /// `NotificationService::recover` or a manual re-enqueue to pick up.
    async fn rearm(&self, job: &Job, now: DateTime<Utc>) -> Result<Option<String>> {
        let payload = &job.payload;
        let Some(frequency) = &payload.frequency else {
            return Ok(None);
        };

        let mut next = payload.scheduled_at;
        loop {
            match frequency.next_after(next) {
                Some(at) if at > now => {
                    next = at;
                    break;
                }
                Some(at) => next = at,
                None => {
                    tracing::warn!(
                        "⚠️ {} has no occurrence after {next}, recurrence stops",
                        job.notification_id
                    );
                    return Ok(None);
                }
            }
        }

        let entry = ScheduleEntry::pending(next, payload.priority);
        let appended = self
            .with_retries(job, "Appending next occurrence", || {
                self.store.append_schedule(&job.notification_id, entry.clone())
            })
            .await;
        match appended {
            Ok(()) => {}
            Err(NotifyError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        }

        let mut next_payload = payload.clone();
        next_payload.scheduled_at = next;
        let token = next.timestamp_millis().to_string();
        let delay = delay_until(&next, &now);
        let job_id = self
            .with_retries(job, "Queueing next occurrence", || {
                self.dispatcher
                    .enqueue(&job.notification_id, next_payload.clone(), delay, &token)
            })
            .await
            .inspect_err(|e| {
                tracing::error!(
                    "❌ Next occurrence of {} left pending, not queued: {e}",
                    job.notification_id
                )
            })?;
        tracing::info!(
            "🔁 Next occurrence of {} ({}) at {next}",
            job.notification_id,
            frequency.describe()
        );
        Ok(Some(job_id))
    }

    /// Worker loop. Exits when `shutdown` flips to true or its sender is dropped.
    pub async fn run(self: Arc<Self>, worker_no: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("👷 Dispatch worker #{worker_no} started ({})", self.transport.name());
        let queue = self.dispatcher.queue().clone();

        while !*shutdown.borrow() {
            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                job = queue.next_ready() => job,
            };

            match next {
                Ok(job) => {
                    let job_id = job.id.clone();
                    if let Err(e) = self.process(job).await {
                        tracing::error!("❌ Worker #{worker_no} failed on {job_id}: {e}");
                    }
                }
                Err(e) => {
                    tracing::error!("❌ Worker #{worker_no} queue error: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        tracing::info!("👷 Dispatch worker #{worker_no} stopped");
    }
}

/// Spawn `count` workers sharing one [`DispatchWorker`].
pub fn spawn_workers(
    worker: Arc<DispatchWorker>,
    count: usize,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (1..=count.max(1))
        .map(|n| tokio::spawn(worker.clone().run(n, shutdown.clone())))
        .collect()
}
