//! CyberIntel-X CLI - Command-line front end for the real-time update channel.
//!
//! Connects to the dashboard backend, streams pushed events to the terminal,
//! sends envelopes, and manages the client configuration file. Useful for
//! headless monitoring, scripting, and debugging the update channel.

mod commands;
mod notifier;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use cix_core::config::{AppConfig, ConfigHandle};
use cix_core::error::CixResult;
use cix_core::logging;

/// CyberIntel-X - real-time threat intelligence updates from the terminal.
#[derive(Parser)]
#[command(
    name = "cix",
    version,
    about = "CyberIntel-X real-time channel CLI",
    long_about = "A command-line client for the CyberIntel-X update channel.\n\
                   Listens for pushed threats, alerts, and sync updates and presents server notifications."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the update channel and print incoming events.
    Listen(commands::listen::ListenArgs),
    /// Send one envelope and exit.
    Send(commands::send::SendArgs),
    /// Probe the update channel and show the connection status.
    Status {
        /// Endpoint address (overrides config).
        #[arg(short, long)]
        address: Option<String>,
        /// Seconds to wait for the connection before reporting.
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
    /// View and modify the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> CixResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_config_path()?,
    };
    let config = if config_path.exists() {
        AppConfig::load_from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    // Initialize logging
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let _guard = logging::init_from_config(&config.logging, &log_dir, cli.verbose)?;

    let config_handle = ConfigHandle::new(config);

    info!("CyberIntel-X CLI v{}", cix_core::constants::APP_VERSION);

    // Dispatch to command handlers
    match cli.command {
        Commands::Listen(args) => {
            commands::listen::run(config_handle, &config_path, args, cli.format).await
        }
        Commands::Send(args) => commands::send::run(config_handle, args, cli.format).await,
        Commands::Status { address, timeout } => {
            commands::status::run(config_handle, address, timeout, cli.format).await
        }
        Commands::Config { action } => {
            commands::config::run(config_handle, &config_path, action, cli.format).await
        }
    }
}
