//! Send command - deliver one envelope over the update channel.

use std::time::Duration;

use clap::Args;
use serde_json::{json, Map, Value};

use cix_core::config::ConfigHandle;
use cix_core::error::{CixError, CixResult};
use cix_realtime::Delivery;

use crate::OutputFormat;

/// Time the writer task gets to put queued frames on the wire before exit.
const FLUSH_GRACE: Duration = Duration::from_millis(250);

#[derive(Args)]
pub struct SendArgs {
    /// Envelope type (e.g. "subscribe", "threat_ack").
    kind: String,
    /// Payload as JSON; anything that is not valid JSON is sent as a string.
    data: Option<String>,
    /// Extra top-level field as KEY=VALUE (repeatable).
    #[arg(long = "field", value_name = "KEY=VALUE")]
    fields: Vec<String>,
    /// Endpoint address (overrides config).
    #[arg(short, long)]
    address: Option<String>,
    /// Wait for a reply of this type and print it.
    #[arg(short, long)]
    reply: Option<String>,
    /// Seconds to wait for a reply.
    #[arg(short, long, default_value = "10")]
    timeout: u64,
}

/// Parse a JSON value, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parse `KEY=VALUE` pairs into extra envelope fields.
fn parse_fields(fields: &[String]) -> CixResult<Map<String, Value>> {
    let mut extra = Map::new();
    for field in fields {
        let (key, value) = field
            .split_once('=')
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| CixError::Config(format!("expected KEY=VALUE, got '{field}'")))?;
        extra.insert(key.to_string(), parse_value(value));
    }
    Ok(extra)
}

/// Run the send command.
pub async fn run(config: ConfigHandle, args: SendArgs, format: OutputFormat) -> CixResult<()> {
    let data = args.data.as_deref().map(parse_value).unwrap_or(Value::Null);
    let extra = parse_fields(&args.fields)?;
    let address = super::resolve_address(&config, args.address).await?;
    let cfg = config.snapshot().await;
    let manager = super::create_manager(&cfg, false);

    let reply = args.reply.as_deref().map(|kind| manager.subscribe_channel(kind));

    let info = super::connect_with_spinner(&manager, &address).await;
    let info = match info {
        Ok(info) => info,
        Err(e) => {
            manager.disconnect();
            return Err(e);
        }
    };

    let transmitted = manager.send_with(&args.kind, data, extra);

    let reply_delivery = match reply {
        Some((_sub, mut rx)) => {
            match tokio::time::timeout(Duration::from_secs(args.timeout), rx.recv()).await {
                Ok(delivery) => delivery,
                Err(_) => {
                    manager.disconnect();
                    return Err(CixError::Internal(format!(
                        "no '{}' reply within {}s",
                        args.reply.as_deref().unwrap_or_default(),
                        args.timeout
                    )));
                }
            }
        }
        None => None,
    };

    manager.disconnect();
    tokio::time::sleep(FLUSH_GRACE).await;

    match format {
        OutputFormat::Json => {
            let out = json!({
                "url": info.url,
                "type": args.kind,
                "sent": transmitted,
                "reply": reply_delivery.as_ref().map(Delivery::data),
            });
            println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        }
        OutputFormat::Text => {
            super::print_outcome(transmitted, &format!("Sent '{}' to {}", args.kind, info.url));
            if let Some(delivery) = reply_delivery {
                println!("  Reply: {}", delivery.data());
            }
        }
    }

    Ok(())
}
