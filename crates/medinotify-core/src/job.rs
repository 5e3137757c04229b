//! Job definitions: the transient, queue-owned unit of dispatch work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{Frequency, Priority};

/// Everything the worker needs to deliver one occurrence and report back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub notification_id: String,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    /// Instant this occurrence was scheduled for.
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    /// Set for recurring notifications so the worker can arm the next occurrence.
    #[serde(default)]
    pub frequency: Option<Frequency>,
}

/// Wait rule between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackoffPolicy {
    /// Same wait before every retry.
    Fixed { delay_ms: u64 },
    /// `base * 2^(attempts_made - 1)`.
    Exponential { base_ms: u64 },
}

impl BackoffPolicy {
    /// Wait before the next attempt, given how many attempts already ran.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        match *self {
            BackoffPolicy::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            BackoffPolicy::Exponential { base_ms } => {
                let exp = attempts_made.saturating_sub(1).min(20);
                Duration::from_millis(base_ms.saturating_mul(1u64 << exp))
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential { base_ms: 5_000 }
    }
}

/// Options passed with `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub delay: Duration,
    pub attempts: u32,
    pub backoff: BackoffPolicy,
}

/// Queue-side job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready to run.
    Waiting,
    /// Ready at a future instant.
    Delayed,
    /// Picked up by a worker.
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// States a job can be cancelled from or observed as outstanding.
    pub const OUTSTANDING: [JobState; 3] = [JobState::Active, JobState::Waiting, JobState::Delayed];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(JobState::Waiting),
            "delayed" => Ok(JobState::Delayed),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state '{other}'")),
        }
    }
}

/// A queued delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub notification_id: String,
    pub payload: JobPayload,
    /// Delay requested at enqueue time.
    pub delay_ms: u64,
    /// When the job next becomes eligible to run.
    pub ready_at: DateTime<Utc>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failed_reason: Option<String>,
}

impl Job {
    /// True if another attempt is allowed after the current one failed.
    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.max_attempts
    }
}
