//! Desktop presentation of built-in notices.

use notify_rust::{Notification, Timeout};
use tracing::debug;

use cix_core::constants::APP_NAME;
use cix_core::error::{CixError, CixResult};
use cix_realtime::{Notice, NotificationSink};

/// Sound theme name played for audible notices.
const ALERT_SOUND: &str = "message-new-instant";

/// Presents notices as native desktop notifications.
pub struct DesktopNotificationSink;

impl NotificationSink for DesktopNotificationSink {
    fn present(&self, notice: &Notice) -> CixResult<()> {
        let timeout = match notice.duration {
            Some(duration) => Timeout::Milliseconds(duration.as_millis().min(u32::MAX as u128) as u32),
            None => Timeout::Never,
        };

        let mut notification = Notification::new();
        notification
            .summary(&notice.title)
            .body(&notice.content)
            .appname(APP_NAME)
            .timeout(timeout);
        if notice.audible {
            notification.sound_name(ALERT_SOUND);
        }

        debug!("showing {} desktop notification: {}", notice.level, notice.title);
        notification
            .show()
            .map(|_| ())
            .map_err(|e| CixError::Notification(e.to_string()))
    }
}
