//! Error taxonomy shared by every MediNotify crate.

use thiserror::Error;

/// Errors surfaced by the notification engine.
///
/// Client-side problems (`Validation`, `NotFound`) are kept apart from system
/// faults so callers never retry bad input and never blame the user for an
/// unavailable queue.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Missing or malformed input: sender, recipient, content, date/time shape, frequency.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record passed validation but no dispatch instant could be derived from it.
    #[error("scheduling failed for notification {id}: {reason}")]
    Scheduling { id: String, reason: String },

    /// The enqueue call itself failed. The record stays persisted but unscheduled.
    #[error("dispatch failed for notification {id}: {reason}")]
    Dispatch { id: String, reason: String },

    /// Transport failure while delivering a job (worker side).
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The transport can never deliver this job, e.g. a malformed recipient address.
    #[error("undeliverable: {0}")]
    Undeliverable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NotifyError {
    /// True when the caller sent something unusable. Never worth retrying.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }

    /// True when the same request might succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Dispatch { .. } | Self::Queue(_) | Self::Store(_) | Self::Delivery(_) | Self::Io(_)
        )
    }

    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Scheduling { .. } => "scheduling",
            Self::Dispatch { .. } => "dispatch",
            Self::Delivery(_) => "delivery",
            Self::Undeliverable(_) => "undeliverable",
            Self::NotFound(_) => "not_found",
            Self::Store(_) => "store",
            Self::Queue(_) => "queue",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
