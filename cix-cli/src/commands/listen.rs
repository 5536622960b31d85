//! Listen command - hold the update channel open and print pushed events.

use std::path::Path;

use clap::Args;
use console::style;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use cix_core::config::ConfigHandle;
use cix_core::error::CixResult;
use cix_realtime::{ChannelSubscriptions, ConnectionState, Delivery, EventKey};

use crate::OutputFormat;

/// Event types printed when none are given on the command line.
const DEFAULT_EVENTS: &[&str] = &["threat_update", "alert", "system_message", "refresh"];

#[derive(Args)]
pub struct ListenArgs {
    /// Endpoint address (overrides config).
    #[arg(short, long)]
    address: Option<String>,
    /// Event type to print (repeatable).
    #[arg(short, long = "event")]
    events: Vec<String>,
    /// Sync collection to follow (repeatable).
    #[arg(short, long = "sync")]
    collections: Vec<String>,
    /// Server channel to join in addition to the configured ones (repeatable).
    #[arg(long = "channel")]
    channels: Vec<String>,
    /// Save the address to the config file after a successful connect.
    #[arg(long)]
    save: bool,
}

/// Run the listen command.
pub async fn run(
    config: ConfigHandle,
    config_path: &Path,
    args: ListenArgs,
    format: OutputFormat,
) -> CixResult<()> {
    let address = super::resolve_address(&config, args.address).await?;
    let cfg = config.snapshot().await;
    let manager = super::create_manager(&cfg, true);

    // Everything printed goes through one channel so output keeps arrival order.
    let (tx, mut rx) = mpsc::unbounded_channel::<(EventKey, Delivery)>();
    let mut keys: Vec<EventKey> = if args.events.is_empty() {
        DEFAULT_EVENTS.iter().map(|e| EventKey::event(*e)).collect()
    } else {
        args.events.iter().map(|e| EventKey::event(e.as_str())).collect()
    };
    keys.extend(args.collections.iter().map(|c| EventKey::sync(c.as_str())));
    keys.push(EventKey::event("error"));

    let _subscriptions: Vec<_> = keys
        .into_iter()
        .map(|key| {
            let tx = tx.clone();
            let label = key.clone();
            manager.subscribe(key, move |delivery| {
                tx.send((label.clone(), delivery.clone()))
                    .map_err(|_| anyhow::anyhow!("listener output closed"))
            })
        })
        .collect();

    let channels = ChannelSubscriptions::attach(&manager);
    channels.join(cfg.realtime.channels.iter().chain(args.channels.iter()).cloned());

    match super::connect_with_spinner(&manager, &address).await {
        Ok(info) => super::print_outcome(true, &format!("Connected to {}", info.url)),
        Err(e) if manager.state() == ConnectionState::Reconnecting => {
            super::print_outcome(false, &format!("{e}"));
            println!("  Retrying in the background...");
            let info = manager.wait_for_connection().await?;
            super::print_outcome(true, &format!("Connected to {}", info.url));
        }
        Err(e) => return Err(e),
    }

    // Subscribed after the first connect so only later transitions are reported.
    let mut state_rx = manager.state_receiver();

    if args.save {
        config.write().await.server.address = address.clone();
        config.save_to(config_path).await?;
        super::print_outcome(true, &format!("Config saved to {}", config_path.display()));
    }

    println!("  Listening for events... (Ctrl+C to stop)");
    println!();

    loop {
        tokio::select! {
            Some((key, delivery)) = rx.recv() => print_delivery(&key, &delivery, format),
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                match state {
                    ConnectionState::Connected => {
                        info!("update channel connected");
                        println!("  {} connection restored", style("INFO").cyan());
                    }
                    ConnectionState::Reconnecting => {
                        warn!("update channel lost, reconnect attempt {}", manager.reconnect_attempts());
                        println!(
                            "  {} connection lost, reconnect attempt {}",
                            style("WARN").yellow(),
                            manager.reconnect_attempts()
                        );
                    }
                    ConnectionState::Abandoned => {
                        let attempts = manager.reconnect_attempts();
                        return Err(cix_core::CixError::ReconnectAbandoned { attempts });
                    }
                    ConnectionState::Disconnected => {
                        println!("  Server closed the connection.");
                        break;
                    }
                    ConnectionState::Connecting => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Disconnecting...");
                break;
            }
        }
    }

    manager.disconnect();
    drop(channels);
    Ok(())
}

fn print_delivery(key: &EventKey, delivery: &Delivery, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let line = match delivery {
                Delivery::Sync(sync) => json!({
                    "key": key.to_string(),
                    "collection": sync.collection,
                    "operation": sync.operation.as_str(),
                    "data": sync.data,
                }),
                Delivery::Error(err) => json!({
                    "key": key.to_string(),
                    "error": err.message,
                }),
                Delivery::Event { event_type, data } => json!({
                    "key": key.to_string(),
                    "type": event_type,
                    "data": data,
                }),
            };
            println!("{line}");
        }
        OutputFormat::Text => {
            let tag = style(format!("[{key}]")).cyan();
            match delivery {
                Delivery::Sync(sync) => println!(
                    "  {tag} {} {}",
                    style(sync.operation.as_str()).bold(),
                    super::truncate(&sync.data.to_string(), 120)
                ),
                Delivery::Error(err) => println!("  {} {}", style("[error]").red(), err.message),
                Delivery::Event { data, .. } => {
                    println!("  {tag} {}", super::truncate(&data.to_string(), 120))
                }
            }
        }
    }
}
