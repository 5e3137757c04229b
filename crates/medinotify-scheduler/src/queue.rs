//! In-process delayed job queue.
//!
//! Jobs are ordered by the instant they become ready. A secondary index keeps
//! `notification_id -> {job_id}` for every outstanding job so cancellation is a
//! lookup, not a scan over all in-flight jobs. Finished jobs are retained in
//! bounded rings (completed / failed) and the oldest are purged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use medinotify_core::config::QueueConfig;
use medinotify_core::{Job, JobOptions, JobPayload, JobQueue, JobState, NotifyError, Result};

use crate::dispatcher::notification_id_from_job_id;

/// How many finished jobs to keep around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            keep_completed: 100,
            keep_failed: 1_000,
        }
    }
}

impl From<&QueueConfig> for Retention {
    fn from(config: &QueueConfig) -> Self {
        Self {
            keep_completed: config.keep_completed,
            keep_failed: config.keep_failed,
        }
    }
}

/// Ordering key: ready instant, then insertion sequence.
type Slot = (DateTime<Utc>, u64);

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, Job>,
    /// Waiting + delayed jobs in ready order.
    schedule: BTreeSet<(DateTime<Utc>, u64, String)>,
    slots: HashMap<String, Slot>,
    seq: u64,
    /// notification id -> outstanding job ids.
    by_notification: HashMap<String, HashSet<String>>,
    completed: VecDeque<String>,
    failed: VecDeque<String>,
}

impl QueueState {
    fn schedule_job(&mut self, job_id: &str, ready_at: DateTime<Utc>) {
        self.seq += 1;
        self.schedule.insert((ready_at, self.seq, job_id.to_string()));
        self.slots.insert(job_id.to_string(), (ready_at, self.seq));
    }

    fn unschedule(&mut self, job_id: &str) {
        if let Some((ready_at, seq)) = self.slots.remove(job_id) {
            self.schedule.remove(&(ready_at, seq, job_id.to_string()));
        }
    }

    /// Index keys for a job: the payload's notification id and, if the job id
    /// follows the `notification-{id}-{token}` format, that id too.
    fn index_keys(job_id: &str, payload: &JobPayload) -> Vec<String> {
        let mut keys = vec![payload.notification_id.clone()];
        if let Some(from_id) = notification_id_from_job_id(job_id)
            && from_id != payload.notification_id
        {
            keys.push(from_id.to_string());
        }
        keys
    }

    fn link(&mut self, job_id: &str, payload: &JobPayload) {
        for key in Self::index_keys(job_id, payload) {
            self.by_notification
                .entry(key)
                .or_default()
                .insert(job_id.to_string());
        }
    }

    fn unlink(&mut self, job_id: &str, payload: &JobPayload) {
        for key in Self::index_keys(job_id, payload) {
            if let Some(ids) = self.by_notification.get_mut(&key) {
                ids.remove(job_id);
                if ids.is_empty() {
                    self.by_notification.remove(&key);
                }
            }
        }
    }

    /// Delayed jobs whose instant has passed become waiting.
    fn promote(&mut self, now: DateTime<Utc>) {
        for (ready_at, _, job_id) in self.schedule.iter() {
            if *ready_at > now {
                break;
            }
            if let Some(job) = self.jobs.get_mut(job_id)
                && job.state == JobState::Delayed
            {
                job.state = JobState::Waiting;
            }
        }
    }

    fn pop_due(&mut self, now: DateTime<Utc>) -> Option<Job> {
        let first = self.schedule.first()?.clone();
        if first.0 > now {
            return None;
        }
        self.schedule.remove(&first);
        self.slots.remove(&first.2);
        let job = self.jobs.get_mut(&first.2)?;
        job.state = JobState::Active;
        job.attempts_made += 1;
        Some(job.clone())
    }

    fn next_ready_at(&self) -> Option<DateTime<Utc>> {
        self.schedule.first().map(|(at, _, _)| *at)
    }

    fn active_mut(&mut self, job_id: &str) -> Result<&mut Job> {
        match self.jobs.get_mut(job_id) {
            Some(job) if job.state == JobState::Active => Ok(job),
            Some(job) => Err(NotifyError::Queue(format!(
                "job {job_id} is {}, not active",
                job.state.as_str()
            ))),
            None => Err(NotifyError::Queue(format!("unknown job {job_id}"))),
        }
    }

    fn finish(&mut self, job_id: &str, state: JobState, reason: Option<&str>, retention: &Retention) -> Result<()> {
        let job = self.active_mut(job_id)?;
        job.state = state;
        job.finished_at = Some(Utc::now());
        if let Some(reason) = reason {
            job.failed_reason = Some(reason.to_string());
        }
        let payload = job.payload.clone();
        self.unlink(job_id, &payload);

        let (ring, keep) = match state {
            JobState::Completed => (&mut self.completed, retention.keep_completed),
            _ => (&mut self.failed, retention.keep_failed),
        };
        ring.push_back(job_id.to_string());
        let mut purged = Vec::new();
        while ring.len() > keep {
            if let Some(old) = ring.pop_front() {
                purged.push(old);
            }
        }
        for old in purged {
            self.jobs.remove(&old);
        }
        Ok(())
    }
}

/// Delayed job queue living in this process.
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    wakeup: Notify,
    retention: Retention,
}

impl MemoryQueue {
    pub fn new(retention: Retention) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            retention,
        }
    }

    /// Number of jobs per state, including retained finished jobs.
    pub async fn counts(&self) -> HashMap<JobState, usize> {
        let mut state = self.state.lock().await;
        state.promote(Utc::now());
        let mut counts = HashMap::new();
        for job in state.jobs.values() {
            *counts.entry(job.state).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Retention::default())
    }
}

fn ready_instant(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or_else(|| now + chrono::Duration::weeks(52 * 100))
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn add(&self, job_id: &str, payload: JobPayload, options: JobOptions) -> Result<Job> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.jobs.get(job_id) {
            tracing::debug!("♻️ Job {job_id} already known ({}), not re-added", existing.state.as_str());
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let ready_at = ready_instant(now, options.delay);
        let job = Job {
            id: job_id.to_string(),
            notification_id: payload.notification_id.clone(),
            payload,
            delay_ms: options.delay.as_millis().min(u128::from(u64::MAX)) as u64,
            ready_at,
            attempts_made: 0,
            max_attempts: options.attempts.max(1),
            backoff: options.backoff,
            state: if options.delay.is_zero() {
                JobState::Waiting
            } else {
                JobState::Delayed
            },
            created_at: now,
            finished_at: None,
            failed_reason: None,
        };

        state.link(job_id, &job.payload);
        state.schedule_job(job_id, ready_at);
        state.jobs.insert(job_id.to_string(), job.clone());
        drop(state);

        tracing::debug!("📥 Job {job_id} queued (ready at {})", ready_at.to_rfc3339());
        self.wakeup.notify_one();
        Ok(job)
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let mut state = self.state.lock().await;
        state.promote(Utc::now());
        Ok(state.jobs.get(job_id).cloned())
    }

    async fn get_jobs(&self, states: &[JobState]) -> Result<Vec<Job>> {
        let mut state = self.state.lock().await;
        state.promote(Utc::now());
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| states.contains(&j.state))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.ready_at.cmp(&b.ready_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn remove(&self, job_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some((current, payload)) = state
            .jobs
            .get(job_id)
            .map(|job| (job.state, job.payload.clone()))
        else {
            return Ok(false);
        };
        match current {
            JobState::Waiting | JobState::Delayed => {
                state.unschedule(job_id);
                state.unlink(job_id, &payload);
                state.jobs.remove(job_id);
                tracing::debug!("🗑️ Job {job_id} removed");
                Ok(true)
            }
            JobState::Active => {
                tracing::debug!("Job {job_id} is in flight, cannot be removed");
                Ok(false)
            }
            JobState::Completed | JobState::Failed => Ok(false),
        }
    }

    async fn job_ids_for_notification(&self, notification_id: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state
            .by_notification
            .get(notification_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    async fn next_ready(&self) -> Result<Job> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Utc::now();
                if let Some(job) = state.pop_due(now) {
                    return Ok(job);
                }
                state
                    .next_ready_at()
                    .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
            };
            match wait {
                Some(d) => {
                    tokio::select! {
                        _ = tokio::time::sleep(d) => {}
                        _ = self.wakeup.notified() => {}
                    }
                }
                None => self.wakeup.notified().await,
            }
        }
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.finish(job_id, JobState::Completed, None, &self.retention)
    }

    async fn retry(&self, job_id: &str, delay: Duration, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let ready_at = ready_instant(Utc::now(), delay);
        let job = state.active_mut(job_id)?;
        job.state = if delay.is_zero() {
            JobState::Waiting
        } else {
            JobState::Delayed
        };
        job.ready_at = ready_at;
        job.failed_reason = Some(reason.to_string());
        state.schedule_job(job_id, ready_at);
        drop(state);
        self.wakeup.notify_one();
        Ok(())
    }

    async fn fail(&self, job_id: &str, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.finish(job_id, JobState::Failed, Some(reason), &self.retention)
    }
}
