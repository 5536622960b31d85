//! Structured logging setup using the `tracing` ecosystem.
//!
//! Two sinks share one filter: a compact console layer on stderr and a
//! daily-rotated `cix.log` file written as plain text or JSON lines.
//! `RUST_LOG`, when set, takes precedence over the configured level.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::{CixError, CixResult};

/// Prefix of the rotated log files.
pub const LOG_FILE_NAME: &str = "cix.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background file writer alive. Dropping it flushes the log file.
#[must_use = "file logging stops when the guard is dropped"]
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Filter from `RUST_LOG`, else `level`, else "info".
fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_layer(writer: NonBlocking, json: bool) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    if json {
        layer.json().with_thread_ids(true).boxed()
    } else {
        layer.boxed()
    }
}

/// Install the global subscriber: console plus rotated file.
///
/// `level` is a filter directive such as "info" or "cix_realtime=debug".
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> CixResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;
    let (writer, worker) = tracing_appender::non_blocking(rolling::daily(log_dir, LOG_FILE_NAME));

    tracing_subscriber::registry()
        .with(file_layer(writer, json_output))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).compact())
        .with(filter_for(level))
        .try_init()
        .map_err(|e| CixError::Internal(format!("logging already initialized: {e}")))?;

    tracing::info!("logging to {} at level={level}", log_dir.display());
    Ok(LogGuard { _worker: worker })
}

/// Initialize logging from the `[logging]` config section.
/// `verbose` forces debug level.
pub fn init_from_config(config: &LoggingConfig, log_dir: &Path, verbose: bool) -> CixResult<LogGuard> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    init_logging(level, log_dir, config.json_output)
}

/// Console-only logging for tests and small tools. Later calls are no-ops.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).compact())
        .with(filter_for(level))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_logging_is_idempotent() {
        init_console_logging("debug");
        init_console_logging("not a valid directive ][");
    }

    #[test]
    fn test_configured_level_is_used() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(filter_for("cix_realtime=debug").to_string().contains("cix_realtime"));
    }
}
