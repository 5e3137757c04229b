//! MediNotify configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{NotifyError, Result};
use crate::job::BackoffPolicy;
use crate::types::FrequencyUnit;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediNotifyConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl MediNotifyConfig {
    /// Load config from the default path (~/.medinotify/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NotifyError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| NotifyError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to a path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| NotifyError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the MediNotify home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".medinotify")
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Request header carrying the authenticated sender identity.
    #[serde(default = "default_sender_header")]
    pub sender_header: String,
    /// Sender used when the header is absent.
    #[serde(default)]
    pub default_sender: Option<String>,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }
fn default_sender_header() -> String { "X-Sender-Email".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            sender_header: default_sender_header(),
            default_sender: None,
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "~/.medinotify/notifications.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

/// Dispatch policy and queue retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Completed jobs kept for observability.
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,
    /// Failed jobs kept for diagnosis.
    #[serde(default = "default_keep_failed")]
    pub keep_failed: usize,
    /// Concurrent dispatch workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_max_attempts() -> u32 { 3 }
fn default_backoff_base_ms() -> u64 { 5_000 }
fn default_keep_completed() -> usize { 100 }
fn default_keep_failed() -> usize { 1_000 }
fn default_workers() -> usize { 2 }

impl QueueConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::Exponential { base_ms: self.backoff_base_ms }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
            workers: default_workers(),
        }
    }
}

/// Scheduling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Unit assumed when a recurrence expression is a bare number ("5").
    #[serde(default = "default_unit")]
    pub default_unit: FrequencyUnit,
    /// Offset of the wall clock that user-supplied date/time refer to.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_unit() -> FrequencyUnit { FrequencyUnit::Minute }

impl ScheduleConfig {
    pub fn utc_offset(&self) -> Result<chrono::FixedOffset> {
        chrono::FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            NotifyError::Config(format!("utc_offset_minutes out of range: {}", self.utc_offset_minutes))
        })
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_unit: default_unit(),
            utc_offset_minutes: 0,
        }
    }
}

/// Delivery transport selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// "log", "email" or "webhook".
    #[serde(default = "default_transport_kind")]
    pub kind: String,
    #[serde(default)]
    pub email: Option<EmailTransportConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookTransportConfig>,
}

fn default_transport_kind() -> String { "log".into() }

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            email: None,
            webhook: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTransportConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Mailbox used in From, e.g. "Front Desk <frontdesk@clinic.org>".
    pub from: String,
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_smtp_port() -> u16 { 587 }
fn default_subject() -> String { "Hospital notification".into() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTransportConfig {
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 { 10 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MediNotifyConfig::default();
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.backoff(), BackoffPolicy::Exponential { base_ms: 5_000 });
        assert_eq!(config.schedule.default_unit, FrequencyUnit::Minute);
        assert_eq!(config.transport.kind, "log");
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [gateway]
            port = 8080
            default_sender = "frontdesk@clinic.org"

            [queue]
            max_attempts = 5
            backoff_base_ms = 1000

            [schedule]
            default_unit = "hour"
            utc_offset_minutes = 330

            [transport]
            kind = "email"

            [transport.email]
            smtp_host = "smtp.clinic.org"
            from = "Clinic <noreply@clinic.org>"
        "#;

        let config: MediNotifyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.default_sender.as_deref(), Some("frontdesk@clinic.org"));
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.keep_completed, 100);
        assert_eq!(config.schedule.default_unit, FrequencyUnit::Hour);
        assert_eq!(config.schedule.utc_offset().unwrap().local_minus_utc(), 330 * 60);
        let email = config.transport.email.unwrap();
        assert_eq!(email.smtp_port, 587);
        assert_eq!(email.subject, "Hospital notification");
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: MediNotifyConfig = toml::from_str("").unwrap();
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.sender_header, "X-Sender-Email");
        assert_eq!(config.queue.workers, 2);
    }

    #[test]
    fn test_bad_offset_is_config_error() {
        let schedule = ScheduleConfig {
            default_unit: FrequencyUnit::Minute,
            utc_offset_minutes: 100_000,
        };
        assert!(matches!(schedule.utc_offset(), Err(NotifyError::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("medinotify-config-test");
        let path = dir.join("config.toml");
        let mut config = MediNotifyConfig::default();
        config.gateway.port = 4100;
        config.save_to(&path).unwrap();
        let loaded = MediNotifyConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.port, 4100);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_home_dir() {
        let home = MediNotifyConfig::home_dir();
        assert!(home.to_string_lossy().contains("medinotify"));
    }
}
