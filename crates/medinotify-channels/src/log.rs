//! Log-only transport for local runs: every delivery succeeds and is traced.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use medinotify_core::{DeliveryTransport, Result};

#[derive(Default)]
pub struct LogTransport {
    delivered: AtomicU64,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeliveryTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, recipient: &str, content: &str) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        tracing::info!("📝 [log transport] to={recipient} ({} chars): {content}", content.chars().count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_delivers() {
        let transport = LogTransport::new();
        transport.send("a@b.com", "hi").await.unwrap();
        transport.send("c@d.com", "").await.unwrap();
        assert_eq!(transport.delivered(), 2);
        assert_eq!(transport.name(), "log");
    }
}
