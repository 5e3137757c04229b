//! # MediNotify Core
//!
//! Shared foundation for the notification engine: the durable record model,
//! queue job model, error taxonomy, configuration, and the traits through which
//! the engine talks to its external collaborators (record store, delayed job
//! queue, delivery transport).

pub mod config;
pub mod error;
pub mod job;
pub mod traits;
pub mod types;

pub use error::{NotifyError, Result};
pub use job::{BackoffPolicy, Job, JobOptions, JobPayload, JobState};
pub use traits::{DeliveryTransport, JobQueue, NotificationFilter, NotificationStore, SortOrder};
pub use types::{
    Frequency, FrequencyUnit, Notification, Priority, ScheduleEntry, ScheduleKind, ScheduleStatus,
};
