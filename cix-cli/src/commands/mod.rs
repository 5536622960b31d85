//! CLI command implementations.

pub mod config;
pub mod listen;
pub mod send;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use console::{style, Term};
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};

use cix_core::config::{AppConfig, ConfigHandle};
use cix_core::error::{CixError, CixResult};
use cix_realtime::{
    ConnectionInfo, ConnectionManager, NotificationPolicy, NotificationSink, Notifier,
    TracingNotificationSink, WsTransport,
};

use crate::notifier::DesktopNotificationSink;

/// Determine the endpoint address: argument > config > interactive prompt.
pub async fn resolve_address(config: &ConfigHandle, address: Option<String>) -> CixResult<String> {
    let raw = match address {
        Some(a) => a,
        None => {
            let current = config.read().await.server.address.clone();
            if !current.is_empty() {
                current
            } else if Term::stdout().is_term() {
                Input::<String>::new()
                    .with_prompt("Update channel address")
                    .interact_text()
                    .map_err(|e| CixError::Internal(e.to_string()))?
            } else {
                return Err(CixError::MissingConfig("server address".into()));
            }
        }
    };

    let sanitized = AppConfig::sanitize_server_address(&raw);
    if sanitized.is_empty() {
        return Err(CixError::MissingConfig("server address".into()));
    }
    Ok(sanitized)
}

/// Build a connection manager over a WebSocket transport.
///
/// With `desktop` set, built-in notices become desktop notifications;
/// otherwise they only go to the log.
pub fn create_manager(config: &AppConfig, desktop: bool) -> ConnectionManager {
    let sink: Arc<dyn NotificationSink> = if desktop {
        Arc::new(DesktopNotificationSink)
    } else {
        Arc::new(TracingNotificationSink)
    };
    let notifier = Notifier::new(sink, NotificationPolicy::from(&config.notifications));
    let transport = WsTransport::new(config.realtime.connect_timeout());
    ConnectionManager::from_config(config, transport, notifier)
}

/// Connect with a spinner on the terminal.
pub async fn connect_with_spinner(
    manager: &ConnectionManager,
    address: &str,
) -> CixResult<ConnectionInfo> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Connecting to {address}..."));

    let result = manager.connect(address).await;
    pb.finish_and_clear();
    result
}

/// Print a one-line outcome marker.
pub fn print_outcome(ok: bool, message: &str) {
    if ok {
        println!("  {} {message}", style("OK").green().bold());
    } else {
        println!("  {} {message}", style("FAIL").red().bold());
    }
}

/// Truncate a string to a maximum number of characters, appending an ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
