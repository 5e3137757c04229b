//! HTTP webhook transport: POSTs each delivery as JSON.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

use medinotify_core::config::WebhookTransportConfig;
use medinotify_core::{DeliveryTransport, NotifyError, Result};

pub struct WebhookTransport {
    url: String,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(config: &WebhookTransportConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| NotifyError::Config(format!("Webhook header '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| NotifyError::Config(format!("Webhook header '{key}' value: {e}")))?;
            headers.insert(name, value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Config(format!("Webhook client: {e}")))?;
        Ok(Self {
            url: config.url.clone(),
            client,
        })
    }
}

#[async_trait]
impl DeliveryTransport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, recipient: &str, content: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "recipient": recipient,
                "content": content,
                "sent_at": chrono::Utc::now().to_rfc3339(),
            }))
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("✅ Webhook delivery to {recipient} via {}", self.url);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(NotifyError::Delivery(format!("Webhook error {status}: {body}")))
        }
    }
}
