//! Application configuration management.
//!
//! Handles loading, saving, and accessing the client configuration: the
//! update channel endpoint, token sources, reconnect/keepalive tuning,
//! notification presentation, and logging. Configuration is persisted as
//! TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants;
use crate::error::{CixError, CixResult};
use crate::paths::AppDirs;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Real-time channel tuning.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Notification presentation settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the update channel (e.g., "wss://intel.example.com/ws").
    #[serde(default)]
    pub address: String,

    /// Bearer token used when no token file or environment override is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Session token file; re-read at every connect so a refreshed token is picked up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
}

/// Reconnect, keepalive, and channel settings for the real-time client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Consecutive automatic reconnect attempts before giving up. 0 disables retries.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base reconnect delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Reconnect delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random jitter (0.0 to 1.0) applied to reconnect delays. 0 disables jitter.
    #[serde(default)]
    pub jitter_factor: f64,

    /// Seconds between keepalive pings.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,

    /// Timeout for opening the transport in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Server channels to join after every connect (e.g. "alerts", "threats:malware").
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Notification presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Whether notifications are shown at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether warning/error notifications play a sound.
    #[serde(default = "default_true")]
    pub sound: bool,

    /// On-screen duration for success/info/warning notifications.
    #[serde(default = "default_notification_duration_ms")]
    pub default_duration_ms: u64,

    /// On-screen duration for error notifications.
    #[serde(default = "default_error_duration_ms")]
    pub error_duration_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_true() -> bool {
    true
}

fn default_max_reconnect_attempts() -> u32 {
    constants::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    constants::DEFAULT_RECONNECT_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    constants::DEFAULT_RECONNECT_MAX_DELAY_MS
}

fn default_keepalive_secs() -> u64 {
    constants::DEFAULT_KEEPALIVE_INTERVAL_SECS
}

fn default_connect_timeout_ms() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_notification_duration_ms() -> u64 {
    constants::DEFAULT_NOTIFICATION_DURATION_MS
}

fn default_error_duration_ms() -> u64 {
    constants::DEFAULT_ERROR_NOTIFICATION_DURATION_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: 0.0,
            keepalive_interval_secs: default_keepalive_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            channels: Vec::new(),
        }
    }
}

impl RealtimeConfig {
    /// Keepalive interval as a Duration.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs.max(1))
    }

    /// Connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: true,
            default_duration_ms: default_notification_duration_ms(),
            error_duration_ms: default_error_duration_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> CixResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> CixResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> CixResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| CixError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> CixResult<PathBuf> {
        Ok(AppDirs::resolve()?.config_file())
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> CixResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(AppDirs::resolve()?.log_dir())
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether the update channel endpoint is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.address.is_empty()
    }

    /// Sanitize and normalize an update channel address.
    ///
    /// Maps http(s) schemes onto ws(s), adds `ws://` when no scheme is
    /// given, and strips trailing slashes and surrounding quotes.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
            trimmed.to_string()
        } else {
            format!("ws://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

/// Thread-safe configuration holder for shared access.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Clone the current configuration out of the handle.
    pub async fn snapshot(&self) -> AppConfig {
        self.inner.read().await.clone()
    }

    /// Save the current configuration to the given path.
    pub async fn save_to(&self, path: &Path) -> CixResult<()> {
        let config = self.inner.read().await;
        config.save_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.realtime.max_reconnect_attempts, 5);
        assert_eq!(config.realtime.keepalive_interval(), Duration::from_secs(30));
        assert_eq!(config.realtime.jitter_factor, 0.0);
        assert_eq!(config.logging.level, "info");
        assert!(!config.is_server_configured());
    }

    #[test]
    fn test_sanitize_server_address() {
        assert_eq!(
            AppConfig::sanitize_server_address("https://intel.example.com/ws/"),
            "wss://intel.example.com/ws"
        );
        assert_eq!(
            AppConfig::sanitize_server_address("http://127.0.0.1:8000/ws"),
            "ws://127.0.0.1:8000/ws"
        );
        assert_eq!(
            AppConfig::sanitize_server_address("  \"wss://example.com/\"  "),
            "wss://example.com"
        );
        assert_eq!(
            AppConfig::sanitize_server_address("localhost:8000/ws"),
            "ws://localhost:8000/ws"
        );
        assert_eq!(AppConfig::sanitize_server_address("   "), "");
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = AppConfig::default();
        config.realtime.channels = vec!["alerts".into()];
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.realtime.channels, vec!["alerts".to_string()]);
        assert!(deserialized.server.token.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            address = "ws://localhost:8000/ws"

            [realtime]
            max_reconnect_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.realtime.max_reconnect_attempts, 2);
        assert_eq!(config.realtime.max_delay_ms, 30_000);
        assert!(config.notifications.enabled);
    }
}
