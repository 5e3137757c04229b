//! Delivery transport trait.

use async_trait::async_trait;

use crate::error::Result;

/// External send-message capability used by the dispatch worker.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// Transport name for logs (email, webhook, log).
    fn name(&self) -> &str;

    /// Deliver `content` to `recipient`. Transient failures come back as
    /// `NotifyError::Delivery`, permanent ones as `NotifyError::Undeliverable`.
    async fn send(&self, recipient: &str, content: &str) -> Result<()>;
}
