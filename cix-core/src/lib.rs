//! CyberIntel-X Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other workspace crates:
//! - Application configuration (endpoint URL, token sources, reconnect tuning)
//! - Global error type covering all error categories
//! - Structured logging with tracing
//! - Application directories (config file, logs)
//! - Protocol constants and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod paths;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, ConfigHandle};
pub use error::{CixError, CixResult};
pub use logging::init_logging;
pub use paths::AppDirs;
