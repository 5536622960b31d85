//! Global error types for the CyberIntel-X client.
//!
//! All error categories across the workspace are unified into a single
//! `CixError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using CixError.
pub type CixResult<T> = Result<T, CixError>;

/// Unified error type covering all error categories in the client.
#[derive(Error, Debug)]
pub enum CixError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// The endpoint URL could not be parsed.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    // -- Transport errors --
    /// The transport failed to open or broke while open.
    #[error("transport error: {0}")]
    Transport(String),

    /// Opening the transport did not complete in time.
    #[error("connect timeout after {0} ms")]
    ConnectTimeout(u64),

    /// A connection attempt failed. Fanned out to every caller that was
    /// waiting on the same in-flight attempt.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The in-flight connection attempt was discarded by an explicit disconnect.
    #[error("connect cancelled by disconnect")]
    ConnectCancelled,

    /// Automatic reconnection gave up after the configured number of attempts.
    #[error("real-time updates stopped after {attempts} reconnect attempts; reload required")]
    ReconnectAbandoned {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The connection manager's background machinery has shut down.
    #[error("connection closed")]
    ConnectionClosed,

    // -- Protocol errors --
    /// An inbound frame was not a well-formed envelope.
    #[error("decode error: {0}")]
    Decode(String),

    // -- Notification errors --
    /// Desktop notification failed.
    #[error("notification error: {0}")]
    Notification(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CixError {
    /// Whether this error describes a failure of the channel as a whole
    /// (as opposed to a single bad message).
    pub fn is_channel_failure(&self) -> bool {
        matches!(
            self,
            CixError::Transport(_)
                | CixError::ConnectTimeout(_)
                | CixError::ConnectFailed(_)
                | CixError::ReconnectAbandoned { .. }
                | CixError::ConnectionClosed
        )
    }
}

impl From<serde_json::Error> for CixError {
    fn from(e: serde_json::Error) -> Self {
        CixError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for CixError {
    fn from(e: toml::de::Error) -> Self {
        CixError::Config(e.to_string())
    }
}

impl From<url::ParseError> for CixError {
    fn from(e: url::ParseError) -> Self {
        CixError::InvalidUrl(e.to_string())
    }
}
