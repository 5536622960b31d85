//! Status command - probe the update channel and show the connection status.

use std::time::{Duration, Instant};

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use console::style;
use serde_json::json;

use cix_core::config::ConfigHandle;
use cix_core::error::CixResult;
use cix_realtime::ConnectionState;

use crate::OutputFormat;

/// Run the status command.
pub async fn run(
    config: ConfigHandle,
    address: Option<String>,
    timeout_secs: u64,
    format: OutputFormat,
) -> CixResult<()> {
    let address = super::resolve_address(&config, address).await?;
    let cfg = config.snapshot().await;
    let manager = super::create_manager(&cfg, false);

    let start = Instant::now();
    let probe = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        super::connect_with_spinner(&manager, &address),
    )
    .await;
    let latency_ms = start.elapsed().as_millis();

    let error = match &probe {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("timed out after {timeout_secs}s")),
    };
    let status = manager.status();
    manager.disconnect();

    match format {
        OutputFormat::Json => {
            let out = json!({
                "address": address,
                "reachable": error.is_none(),
                "latency_ms": latency_ms,
                "error": error,
                "status": status,
                "channels": cfg.realtime.channels,
                "notifications_enabled": cfg.notifications.enabled,
            });
            println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!("{}", style("Connection").bold().underlined());
            println!("  Endpoint:  {}", status.url.as_deref().unwrap_or(&address));
            let state = match status.state {
                ConnectionState::Connected => {
                    format!("{} ({}ms)", style("connected").green(), latency_ms)
                }
                ConnectionState::Abandoned => style("abandoned").red().to_string(),
                other => style(other.to_string()).yellow().to_string(),
            };
            println!("  Status:    {state}");
            if let Some(err) = &error {
                println!("  Error:     {}", style(err).red());
            }
            if let Some(since) = status.connected_since {
                println!("  Since:     {}", since.format("%Y-%m-%d %H:%M:%S UTC"));
            }

            println!();
            println!("{}", style("Real-time Settings").bold().underlined());
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Setting", "Value"]);
            table.add_row(vec![
                "Max reconnect attempts".to_string(),
                status.max_reconnect_attempts.to_string(),
            ]);
            table.add_row(vec![
                "Backoff".to_string(),
                format!("{}ms base, {}ms cap", cfg.realtime.base_delay_ms, cfg.realtime.max_delay_ms),
            ]);
            table.add_row(vec![
                "Keepalive".to_string(),
                format!("every {}s", cfg.realtime.keepalive_interval().as_secs()),
            ]);
            table.add_row(vec![
                "Channels".to_string(),
                if cfg.realtime.channels.is_empty() {
                    "-".to_string()
                } else {
                    cfg.realtime.channels.join(", ")
                },
            ]);
            table.add_row(vec![
                "Notifications".to_string(),
                if cfg.notifications.enabled { "on" } else { "off" }.to_string(),
            ]);
            println!("{table}");
        }
    }

    Ok(())
}
