//! CyberIntel-X Realtime - push-update client for the dashboard backend.
//!
//! This crate provides the real-time synchronization client that handles:
//! - A single persistent connection authenticated with a bearer token
//! - Automatic reconnection with exponential backoff and an attempt ceiling
//! - Keepalive pings while connected
//! - An outbound queue flushed in order on connect
//! - Publish/subscribe dispatch keyed by event type or `sync:{collection}`
//! - Built-in handling of server notifications and protocol errors
//! - Server channel membership and a foreground reconnect trigger

pub mod channels;
pub mod dispatcher;
pub mod envelope;
pub mod manager;
pub mod notify;
pub mod queue;
pub mod registry;
pub mod token;
pub mod transport;
pub mod visibility;

// Re-export key types
pub use channels::ChannelSubscriptions;
pub use dispatcher::Dispatcher;
pub use envelope::{
    Envelope, ErrorMessage, NotificationLevel, NotificationPayload, Payload, SyncMessage,
    SyncOperation,
};
pub use manager::{
    ConnectionInfo, ConnectionManager, ConnectionState, ConnectionStatus, KeepaliveConfig,
    ReconnectConfig,
};
pub use notify::{Notice, NotificationPolicy, NotificationSink, Notifier, TracingNotificationSink};
pub use registry::{Delivery, EventKey, Subscription, SubscriptionRegistry};
pub use token::{EnvToken, FileToken, NoToken, StaticToken, TokenChain, TokenProvider};
pub use transport::{
    CloseSignal, Incoming, MemoryPeer, MemoryTransport, OpenOutcome, Outgoing, Transport,
    TransportLink, WsTransport,
};
pub use visibility::{Visibility, VisibilityTrigger};
