//! Notification service: validates, persists, schedules and cancels notifications.
//!
//! `create` runs validate → persist → compute delay → enqueue. Each step is one
//! atomic store or queue call; a failure after persist leaves the record in
//! place for inspection and manual re-enqueue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};

use medinotify_core::{
    FrequencyUnit, JobPayload, Notification, NotificationFilter, NotificationStore, NotifyError,
    Priority, Result, ScheduleEntry, ScheduleKind, ScheduleStatus,
};

use crate::delay::{check_shape, compute_delay, delay_until, resolve_instant};
use crate::dispatcher::JobDispatcher;
use crate::frequency::normalize_frequency_with;

/// Input to [`NotificationService::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateNotification {
    pub recipient: String,
    pub content: String,
    pub future: bool,
    pub date: Option<String>,
    pub time: Option<String>,
    pub recurring: bool,
    pub frequency: Option<String>,
    pub priority: Priority,
}

/// Result of a successful create.
#[derive(Debug, Clone)]
pub struct Created {
    pub notification: Notification,
    pub kind: ScheduleKind,
    pub job_id: String,
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    pub id: String,
    /// Zero when the job already fired or was never queued.
    pub removed_job_count: usize,
}

pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    dispatcher: JobDispatcher,
    default_unit: FrequencyUnit,
    utc_offset: FixedOffset,
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(NotifyError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        dispatcher: JobDispatcher,
        default_unit: FrequencyUnit,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            dispatcher,
            default_unit,
            utc_offset,
        }
    }

    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    pub async fn create(&self, sender: &str, input: CreateNotification) -> Result<Created> {
        self.create_at(sender, input, Utc::now()).await
    }

    /// [`create`](Self::create) against an explicit clock reading.
    pub async fn create_at(
        &self,
        sender: &str,
        input: CreateNotification,
        now: DateTime<Utc>,
    ) -> Result<Created> {
        // 1. validate
        let sender = required("sender", sender)?;
        let recipient = required("recipient", &input.recipient)?;
        let content = required("content", &input.content)?;
        let frequency = if input.recurring {
            let raw = input.frequency.as_deref().unwrap_or_default();
            Some(normalize_frequency_with(raw, self.default_unit)?)
        } else {
            None
        };
        let (date, time) = (input.date.as_deref(), input.time.as_deref());
        if input.future {
            check_shape(date, time)?;
        }

        // 2. persist
        let target = match (input.future, date, time) {
            (true, Some(d), Some(t)) => resolve_instant(d, t, &self.utc_offset).ok(),
            _ => None,
        };
        let requested_schedule = match (input.future, date, time) {
            (true, Some(d), Some(t)) => Some(format!("{} {}", d.trim(), t.trim())),
            _ => None,
        };
        let mut notification = Notification {
            id: Notification::new_id(),
            sender_identity: sender,
            recipient_identity: recipient,
            content,
            is_future: input.future,
            scheduled_date: target.map(|t| t.date_naive()),
            scheduled_time: target.map(|t| t.time()),
            requested_schedule,
            is_recurring: input.recurring,
            frequency,
            schedule_history: Vec::new(),
            created_at: now,
        };
        if let Some(target) = target {
            notification
                .schedule_history
                .push(ScheduleEntry::pending(target.with_timezone(&Utc), input.priority));
        }
        self.store.insert(&notification).await?;

        // 3. delay
        let delay = compute_delay(input.future, date, time, &now.with_timezone(&self.utc_offset))
            .map_err(|e| NotifyError::Scheduling {
                id: notification.id.clone(),
                reason: e.to_string(),
            })?;

        // 4. enqueue
        let scheduled_at = target.map_or(now, |t| t.with_timezone(&Utc));
        let job_id = self
            .dispatcher
            .enqueue(
                &notification.id,
                payload_for(&notification, scheduled_at, input.priority),
                delay,
                &scheduled_at.timestamp_millis().to_string(),
            )
            .await?;

        let kind = notification.schedule_kind();
        tracing::info!(
            "📨 Notification {} created ({:?}, delay {}ms) for {}",
            notification.id,
            kind,
            delay.as_millis(),
            notification.recipient_identity
        );
        Ok(Created {
            notification,
            kind,
            job_id,
            delay,
        })
    }

    /// Remove outstanding jobs, then the record.
    pub async fn cancel(&self, id: &str) -> Result<Cancelled> {
        if self.store.find_by_id(id).await?.is_none() {
            return Err(NotifyError::NotFound(format!("notification {id}")));
        }
        let removed_job_count = self.dispatcher.find_and_remove_by_notification_id(id).await?;
        self.store.delete_by_id(id).await?;
        tracing::info!("🛑 Notification {id} cancelled ({removed_job_count} job(s) removed)");
        Ok(Cancelled {
            id: id.to_string(),
            removed_job_count,
        })
    }

    pub async fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        self.store.find(filter).await
    }

    pub async fn get(&self, id: &str) -> Result<Notification> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| NotifyError::NotFound(format!("notification {id}")))
    }

    /// Enqueue the record's outstanding occurrence again. Uses the same
    /// idempotency token as the original enqueue, so a job that still exists
    /// is not duplicated.
    pub async fn reenqueue(&self, id: &str) -> Result<String> {
        self.reenqueue_at(id, Utc::now()).await
    }

    async fn reenqueue_at(&self, id: &str, now: DateTime<Utc>) -> Result<String> {
        let notification = self.get(id).await?;
        let (scheduled_at, priority) = match notification.latest_entry() {
            Some(entry) if entry.status == ScheduleStatus::Pending => {
                (entry.scheduled_instant, entry.priority)
            }
            Some(entry) => {
                return Err(NotifyError::Validation(format!(
                    "notification {id} has no pending occurrence (last: {})",
                    entry.status.as_str()
                )));
            }
            None if !notification.is_future => (notification.created_at, Priority::default()),
            None => {
                return Err(NotifyError::Scheduling {
                    id: id.to_string(),
                    reason: "no schedulable instant recorded".into(),
                });
            }
        };

        let job_id = self
            .dispatcher
            .enqueue(
                id,
                payload_for(&notification, scheduled_at, priority),
                delay_until(&scheduled_at, &now),
                &scheduled_at.timestamp_millis().to_string(),
            )
            .await?;
        tracing::info!("🔄 Notification {id} re-enqueued as {job_id}");
        Ok(job_id)
    }

    /// Re-enqueue every record still awaiting dispatch. The in-process queue
    /// starts empty; call this once on startup.
    pub async fn recover(&self) -> Result<usize> {
        let records = self.store.find(&NotificationFilter::default()).await?;
        let mut recovered = 0;
        for n in records.iter().filter(|n| n.awaiting_dispatch()) {
            match self.reenqueue(&n.id).await {
                Ok(_) => recovered += 1,
                Err(e) => tracing::warn!("⚠️ Could not recover notification {}: {e}", n.id),
            }
        }
        if recovered > 0 {
            tracing::info!("♻️ Recovered {recovered} pending notification(s)");
        }
        Ok(recovered)
    }
}

fn payload_for(n: &Notification, scheduled_at: DateTime<Utc>, priority: Priority) -> JobPayload {
    JobPayload {
        notification_id: n.id.clone(),
        sender: n.sender_identity.clone(),
        recipient: n.recipient_identity.clone(),
        content: n.content.clone(),
        scheduled_at,
        priority,
        frequency: n.frequency.clone(),
    }
}
