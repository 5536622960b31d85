//! User-facing notices: server notifications, protocol errors, and the
//! "real-time updates stopped" warning.
//!
//! Rendering is delegated to a [`NotificationSink`]; this module only maps
//! inbound payloads onto a presentation ([`Notice`]) using the configured
//! [`NotificationPolicy`].

use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use cix_core::config::NotificationConfig;
use cix_core::error::CixResult;

use crate::envelope::{ErrorMessage, NotificationLevel, NotificationPayload};

/// A notice ready to be shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NotificationLevel,
    pub title: String,
    pub content: String,
    pub action: Option<Value>,
    /// How long the notice stays on screen. `None` means until dismissed.
    pub duration: Option<Duration>,
    /// Whether an audible cue accompanies the notice.
    pub audible: bool,
}

impl Notice {
    pub fn is_durable(&self) -> bool {
        self.duration.is_none()
    }
}

/// Renders notices.
pub trait NotificationSink: Send + Sync + 'static {
    fn present(&self, notice: &Notice) -> CixResult<()>;
}

/// Default sink: writes notices to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn present(&self, notice: &Notice) -> CixResult<()> {
        match notice.level {
            NotificationLevel::Error => error!(
                durable = notice.is_durable(),
                "notification: {}: {}", notice.title, notice.content
            ),
            NotificationLevel::Warning => warn!("notification: {}: {}", notice.title, notice.content),
            _ => info!(
                severity = notice.level.as_str(),
                "notification: {}: {}", notice.title, notice.content
            ),
        }
        Ok(())
    }
}

/// Maps payloads onto notices.
#[derive(Debug, Clone)]
pub struct NotificationPolicy {
    pub enabled: bool,
    pub sound: bool,
    pub default_duration: Duration,
    pub error_duration: Duration,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self::from(&NotificationConfig::default())
    }
}

impl From<&NotificationConfig> for NotificationPolicy {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            sound: config.sound,
            default_duration: Duration::from_millis(config.default_duration_ms),
            error_duration: Duration::from_millis(config.error_duration_ms),
        }
    }
}

impl NotificationPolicy {
    fn duration_for(&self, level: NotificationLevel) -> Duration {
        match level {
            NotificationLevel::Error => self.error_duration,
            _ => self.default_duration,
        }
    }

    fn audible_for(&self, level: NotificationLevel) -> bool {
        self.sound && matches!(level, NotificationLevel::Warning | NotificationLevel::Error)
    }

    /// Presentation for a server `notification` envelope.
    pub fn for_notification(&self, payload: &NotificationPayload) -> Notice {
        Notice {
            level: payload.level,
            title: payload.title.clone(),
            content: payload.content.clone(),
            action: payload.action.clone(),
            duration: Some(self.duration_for(payload.level)),
            audible: self.audible_for(payload.level),
        }
    }

    /// Transient presentation for a protocol `error` envelope.
    pub fn for_error(&self, err: &ErrorMessage) -> Notice {
        Notice {
            level: NotificationLevel::Error,
            title: "Server error".to_string(),
            content: err.message.clone(),
            action: None,
            duration: Some(self.error_duration),
            audible: self.audible_for(NotificationLevel::Error),
        }
    }

    /// Durable warning shown once automatic reconnection gives up.
    pub fn for_abandoned(&self, attempts: u32) -> Notice {
        Notice {
            level: NotificationLevel::Error,
            title: "Real-time updates stopped".to_string(),
            content: format!(
                "Lost connection to the server after {attempts} reconnect attempts. \
                 Data shown may be out of date; reload to reconnect."
            ),
            action: Some(serde_json::json!({ "type": "reload" })),
            duration: None,
            audible: self.audible_for(NotificationLevel::Error),
        }
    }
}

/// Sink plus policy, shared by the dispatcher and the connection manager.
#[derive(Clone)]
pub struct Notifier {
    sink: std::sync::Arc<dyn NotificationSink>,
    policy: NotificationPolicy,
}

impl Notifier {
    pub fn new(sink: std::sync::Arc<dyn NotificationSink>, policy: NotificationPolicy) -> Self {
        Self { sink, policy }
    }

    pub fn policy(&self) -> &NotificationPolicy {
        &self.policy
    }

    /// Present a notice. Failures are logged, never propagated.
    pub fn show(&self, notice: Notice) {
        if !self.policy.enabled {
            return;
        }
        if let Err(e) = self.sink.present(&notice) {
            warn!("failed to present notification '{}': {e}", notice.title);
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(std::sync::Arc::new(TracingNotificationSink), NotificationPolicy::default())
    }
}
