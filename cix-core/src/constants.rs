//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "CyberIntel-X";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory name used under the platform config/data directories.
pub const APP_DIR_NAME: &str = "cyberintel-x";

/// Query parameter carrying the bearer token on the update channel URL.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Environment variable that overrides the configured bearer token.
pub const TOKEN_ENV_VAR: &str = "CIX_TOKEN";

/// Environment variable that relocates the config and data directories.
pub const HOME_ENV_VAR: &str = "CIX_HOME";

/// Default ceiling on consecutive automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Reconnect delay cap in milliseconds.
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Interval between keepalive pings in seconds.
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 30;

/// Timeout for opening the transport in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// On-screen duration for non-error notifications in milliseconds.
pub const DEFAULT_NOTIFICATION_DURATION_MS: u64 = 4_500;

/// On-screen duration for error notifications in milliseconds.
pub const DEFAULT_ERROR_NOTIFICATION_DURATION_MS: u64 = 10_000;

/// WebSocket close codes used by the lifecycle manager.
pub mod close_code {
    /// Normal closure; an explicit local or server-initiated shutdown.
    pub const NORMAL: u16 = 1000;
    /// Abnormal closure; no close frame was received.
    pub const ABNORMAL: u16 = 1006;
}

/// Reserved envelope type discriminators.
pub mod message_type {
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
    pub const NOTIFICATION: &str = "notification";
    pub const SYNC: &str = "sync";

    /// Server channel control messages.
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const SUBSCRIPTION_UPDATE: &str = "subscription_update";

    /// All reserved core types.
    pub const RESERVED: &[&str] = &[PING, PONG, ERROR, NOTIFICATION, SYNC];

    /// Whether a type string is one of the reserved core types.
    pub fn is_reserved(kind: &str) -> bool {
        RESERVED.contains(&kind)
    }
}
