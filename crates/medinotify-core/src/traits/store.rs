//! Notification record store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Notification, Priority, ScheduleEntry, ScheduleStatus};

/// Ordering by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Read filter for `find`.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    /// Only records created by this sender.
    pub sender: Option<String>,
    pub limit: Option<usize>,
    pub sort: SortOrder,
}

impl NotificationFilter {
    pub fn by_sender(sender: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
            ..Self::default()
        }
    }
}

/// Durable persistence of notification documents.
///
/// Each call is a single atomic operation against the backend.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Notification>>;

    async fn find(&self, filter: &NotificationFilter) -> Result<Vec<Notification>>;

    /// Returns false when nothing was deleted.
    async fn delete_by_id(&self, id: &str) -> Result<bool>;

    /// Record a delivery outcome: update the pending entry scheduled at
    /// `scheduled_at`, or append a new entry if there is none.
    /// Fails with `NotFound` when the record no longer exists.
    async fn record_outcome(
        &self,
        id: &str,
        scheduled_at: DateTime<Utc>,
        priority: Priority,
        status: ScheduleStatus,
    ) -> Result<()>;

    /// Append a schedule entry. Fails with `NotFound` when the record no longer exists.
    async fn append_schedule(&self, id: &str, entry: ScheduleEntry) -> Result<()>;
}
