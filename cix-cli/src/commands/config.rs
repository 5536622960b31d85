//! Config commands.

use std::path::Path;

use clap::Subcommand;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use console::style;

use cix_core::config::{AppConfig, ConfigHandle};
use cix_core::error::{CixError, CixResult};

use crate::OutputFormat;

/// Every key accepted by `get` and `set`, in display order.
const KEYS: &[&str] = &[
    "server.address",
    "server.token",
    "server.token_file",
    "realtime.max_reconnect_attempts",
    "realtime.base_delay_ms",
    "realtime.max_delay_ms",
    "realtime.jitter_factor",
    "realtime.keepalive_interval_secs",
    "realtime.connect_timeout_ms",
    "realtime.channels",
    "notifications.enabled",
    "notifications.sound",
    "notifications.default_duration_ms",
    "notifications.error_duration_ms",
    "logging.level",
    "logging.directory",
    "logging.json_output",
];

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show all settings.
    Show,
    /// Print the configuration file path.
    Path,
    /// Get a setting value by key path.
    Get {
        /// Setting key path (e.g., "server.address", "realtime.channels").
        key: String,
    },
    /// Set a setting value by key path and save the file.
    Set {
        /// Setting key path (e.g., "server.address", "realtime.channels").
        key: String,
        /// New value. Lists are comma-separated.
        value: String,
    },
}

/// Resolve a dot-separated key path to a display value.
fn get_setting_value(cfg: &AppConfig, key: &str) -> Option<String> {
    let value = match key {
        "server.address" => cfg.server.address.clone(),
        "server.token" => match cfg.server.token {
            Some(_) => "********".to_string(),
            None => String::new(),
        },
        "server.token_file" => cfg
            .server
            .token_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        "realtime.max_reconnect_attempts" => cfg.realtime.max_reconnect_attempts.to_string(),
        "realtime.base_delay_ms" => cfg.realtime.base_delay_ms.to_string(),
        "realtime.max_delay_ms" => cfg.realtime.max_delay_ms.to_string(),
        "realtime.jitter_factor" => cfg.realtime.jitter_factor.to_string(),
        "realtime.keepalive_interval_secs" => cfg.realtime.keepalive_interval_secs.to_string(),
        "realtime.connect_timeout_ms" => cfg.realtime.connect_timeout_ms.to_string(),
        "realtime.channels" => cfg.realtime.channels.join(","),
        "notifications.enabled" => cfg.notifications.enabled.to_string(),
        "notifications.sound" => cfg.notifications.sound.to_string(),
        "notifications.default_duration_ms" => cfg.notifications.default_duration_ms.to_string(),
        "notifications.error_duration_ms" => cfg.notifications.error_duration_ms.to_string(),
        "logging.level" => cfg.logging.level.clone(),
        "logging.directory" => cfg.logging.directory.clone(),
        "logging.json_output" => cfg.logging.json_output.to_string(),
        _ => return None,
    };
    Some(value)
}

fn parse<T: std::str::FromStr>(value: &str, expected: &str) -> Result<T, String> {
    value.trim().parse().map_err(|_| format!("expected {expected}"))
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Apply a value to a dot-separated key path on the config.
fn set_setting_value(cfg: &mut AppConfig, key: &str, value: &str) -> Result<(), String> {
    match key {
        "server.address" => cfg.server.address = AppConfig::sanitize_server_address(value),
        "server.token" => cfg.server.token = optional(value),
        "server.token_file" => cfg.server.token_file = optional(value).map(Into::into),
        "realtime.max_reconnect_attempts" => {
            cfg.realtime.max_reconnect_attempts = parse(value, "an integer (0 = no retries)")?
        }
        "realtime.base_delay_ms" => cfg.realtime.base_delay_ms = parse(value, "an integer")?,
        "realtime.max_delay_ms" => cfg.realtime.max_delay_ms = parse(value, "an integer")?,
        "realtime.jitter_factor" => {
            let jitter: f64 = parse(value, "a number between 0 and 1")?;
            if !(0.0..=1.0).contains(&jitter) {
                return Err("expected a number between 0 and 1".to_string());
            }
            cfg.realtime.jitter_factor = jitter;
        }
        "realtime.keepalive_interval_secs" => {
            cfg.realtime.keepalive_interval_secs = parse(value, "an integer")?
        }
        "realtime.connect_timeout_ms" => cfg.realtime.connect_timeout_ms = parse(value, "an integer")?,
        "realtime.channels" => {
            cfg.realtime.channels = value
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect()
        }
        "notifications.enabled" => cfg.notifications.enabled = parse(value, "true/false")?,
        "notifications.sound" => cfg.notifications.sound = parse(value, "true/false")?,
        "notifications.default_duration_ms" => {
            cfg.notifications.default_duration_ms = parse(value, "an integer")?
        }
        "notifications.error_duration_ms" => {
            cfg.notifications.error_duration_ms = parse(value, "an integer")?
        }
        "logging.level" => {
            let v = value.to_lowercase();
            if !["trace", "debug", "info", "warn", "error"].contains(&v.as_str()) {
                return Err("expected one of: trace, debug, info, warn, error".to_string());
            }
            cfg.logging.level = v;
        }
        "logging.directory" => cfg.logging.directory = value.trim().to_string(),
        "logging.json_output" => cfg.logging.json_output = parse(value, "true/false")?,
        _ => return Err(format!("unknown key '{key}'")),
    }
    Ok(())
}

/// Run a config command.
pub async fn run(
    config: ConfigHandle,
    config_path: &Path,
    action: ConfigAction,
    format: OutputFormat,
) -> CixResult<()> {
    match action {
        ConfigAction::Show => {
            let cfg = config.read().await;
            match format {
                OutputFormat::Json => {
                    let entries: serde_json::Map<String, serde_json::Value> = KEYS
                        .iter()
                        .filter_map(|k| get_setting_value(&cfg, k).map(|v| (k.to_string(), v.into())))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&entries).unwrap_or_default());
                }
                OutputFormat::Text => {
                    let mut table = Table::new();
                    table
                        .load_preset(UTF8_FULL)
                        .apply_modifier(UTF8_ROUND_CORNERS)
                        .set_content_arrangement(ContentArrangement::Dynamic);
                    table.set_header(vec!["Key", "Value"]);
                    for key in KEYS {
                        let value = get_setting_value(&cfg, key).unwrap_or_default();
                        table.add_row(vec![key.to_string(), super::truncate(&value, 60)]);
                    }
                    println!("{table}");
                }
            }
        }
        ConfigAction::Path => match format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "path": config_path.display().to_string() }))
            }
            OutputFormat::Text => println!("{}", config_path.display()),
        },
        ConfigAction::Get { key } => {
            let cfg = config.read().await;
            let value = get_setting_value(&cfg, &key)
                .ok_or_else(|| CixError::Config(format!("unknown key '{key}'")))?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "key": key, "value": value })),
                OutputFormat::Text => println!("{value}"),
            }
        }
        ConfigAction::Set { key, value } => {
            {
                let mut cfg = config.write().await;
                set_setting_value(&mut cfg, &key, &value)
                    .map_err(|e| CixError::Config(format!("{key}: {e}")))?;
            }
            config.save_to(config_path).await?;
            let cfg = config.read().await;
            let shown = get_setting_value(&cfg, &key).unwrap_or_default();
            println!(
                "  {} {} = {}",
                style("OK").green().bold(),
                style(&key).bold(),
                shown
            );
        }
    }

    Ok(())
}
