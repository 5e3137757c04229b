//! # MediNotify Channels
//! Delivery transports consumed by the dispatch worker.

pub mod email;
pub mod log;
pub mod webhook;

use std::sync::Arc;

use medinotify_core::config::TransportConfig;
use medinotify_core::{DeliveryTransport, NotifyError, Result};

pub use email::EmailTransport;
pub use log::LogTransport;
pub use webhook::WebhookTransport;

/// Build the transport named by `config.kind`.
pub fn transport_from_config(config: &TransportConfig) -> Result<Arc<dyn DeliveryTransport>> {
    match config.kind.trim().to_ascii_lowercase().as_str() {
        "log" => Ok(Arc::new(LogTransport::new())),
        "email" | "smtp" => {
            let email = config.email.as_ref().ok_or_else(|| {
                NotifyError::Config("transport.kind = \"email\" needs a [transport.email] section".into())
            })?;
            Ok(Arc::new(EmailTransport::new(email)?))
        }
        "webhook" => {
            let webhook = config.webhook.as_ref().ok_or_else(|| {
                NotifyError::Config("transport.kind = \"webhook\" needs a [transport.webhook] section".into())
            })?;
            Ok(Arc::new(WebhookTransport::new(webhook)?))
        }
        other => Err(NotifyError::Config(format!("unknown transport kind '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medinotify_core::config::WebhookTransportConfig;

    #[test]
    fn test_default_is_log() {
        let transport = transport_from_config(&TransportConfig::default()).unwrap();
        assert_eq!(transport.name(), "log");
    }

    #[test]
    fn test_missing_section_is_config_error() {
        for kind in ["email", "webhook"] {
            let config = TransportConfig {
                kind: kind.into(),
                ..TransportConfig::default()
            };
            assert!(matches!(transport_from_config(&config), Err(NotifyError::Config(_))), "{kind}");
        }
    }

    #[test]
    fn test_webhook_from_config() {
        let config = TransportConfig {
            kind: "Webhook".into(),
            webhook: Some(WebhookTransportConfig {
                url: "http://localhost:9000/notify".into(),
                headers: vec![],
                timeout_secs: 3,
            }),
            ..TransportConfig::default()
        };
        assert_eq!(transport_from_config(&config).unwrap().name(), "webhook");
    }

    #[test]
    fn test_unknown_kind() {
        let config = TransportConfig {
            kind: "pigeon".into(),
            ..TransportConfig::default()
        };
        assert!(matches!(transport_from_config(&config), Err(NotifyError::Config(_))));
    }
}
