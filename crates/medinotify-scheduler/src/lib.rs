//! # MediNotify Scheduler
//!
//! Turns "send this now / at a future time / repeatedly" into time-ordered,
//! at-least-once deliveries.
//!
//! ## Architecture
//! ```text
//! NotificationService::create
//!   ├── validate (shape, frequency)        frequency.rs / delay.rs
//!   ├── persist record                     persistence.rs (SQLite)
//!   ├── compute delay                      delay.rs
//!   └── JobDispatcher::enqueue             dispatcher.rs
//!          └── MemoryQueue (ready-ordered, notification index)   queue.rs
//!                 └── DispatchWorker × N → DeliveryTransport      worker.rs
//!                        ├── sent / failed → scheduleHistory
//!                        └── recurring → re-arm next occurrence
//!
//! NotificationService::cancel
//!   ├── JobDispatcher::find_and_remove_by_notification_id
//!   └── delete record
//! ```
//!
//! Cancellation cannot retract a delivery already in flight; such a
//! notification may still be delivered once.

pub mod delay;
pub mod dispatcher;
pub mod frequency;
pub mod persistence;
pub mod queue;
pub mod service;
pub mod worker;

pub use delay::{ScheduleParseError, compute_delay};
pub use dispatcher::{DispatchPolicy, JobDispatcher, job_id_for};
pub use frequency::{normalize_frequency, normalize_frequency_with};
pub use persistence::SqliteNotificationStore;
pub use queue::{MemoryQueue, Retention};
pub use service::{Cancelled, CreateNotification, Created, NotificationService};
pub use worker::{DispatchWorker, JobOutcome, spawn_workers};
