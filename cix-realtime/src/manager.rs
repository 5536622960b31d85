//! Connection lifecycle manager.
//!
//! Owns the single link to the update channel and handles:
//! - Connecting with the current bearer token appended to the endpoint
//! - At most one open attempt in flight; concurrent `connect` calls join it
//! - Keepalive ping every 30 seconds while connected
//! - Automatic reconnection with exponential backoff (2s, 4s, 8s, 16s, max 30s)
//! - Giving up after a configured number of attempts, with a durable notice
//! - Queueing outbound messages while the link is down and flushing them in
//!   order on the next connect
//!
//! State lives behind one short-held mutex that is never held across an
//! `.await` or a handler call. Every physical link is tagged with a
//! generation number; events from an older generation are ignored.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use cix_core::config::{AppConfig, RealtimeConfig};
use cix_core::constants::{self, close_code, message_type};
use cix_core::error::{CixError, CixResult};

use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, Payload, SyncMessage};
use crate::notify::Notifier;
use crate::queue::OutboundQueue;
use crate::registry::{Delivery, EventKey, Subscription};
use crate::token::{self, TokenChain, TokenProvider};
use crate::transport::{CloseSignal, Incoming, Outgoing, Transport, TransportLink};

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay; attempt N waits `base_delay * 2^N`.
    pub base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    pub max_delay: Duration,
    /// Maximum number of automatic reconnect attempts. 0 disables retries.
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0) applied to each delay. 0 disables jitter.
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(constants::DEFAULT_RECONNECT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(constants::DEFAULT_RECONNECT_MAX_DELAY_MS),
            max_attempts: constants::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            jitter_factor: 0.0,
        }
    }
}

impl From<&RealtimeConfig> for ReconnectConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_reconnect_attempts,
            jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt`: `min(base * 2^attempt, max)`.
    ///
    /// With a jitter factor, +/- that fraction is applied and the result is
    /// still capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let exponential = base_ms.saturating_mul(1u64 << attempt.min(32)).min(max_ms);

        if self.jitter_factor <= 0.0 {
            return Duration::from_millis(exponential);
        }
        let jitter_range = exponential as f64 * self.jitter_factor.min(1.0);
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let delay = (exponential as f64 + jitter).clamp(0.0, max_ms as f64);
        Duration::from_millis(delay as u64)
    }
}

/// Keepalive configuration.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between keepalive pings.
    pub interval: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(constants::DEFAULT_KEEPALIVE_INTERVAL_SECS),
        }
    }
}

impl From<&RealtimeConfig> for KeepaliveConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            interval: config.keepalive_interval(),
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected and no retry scheduled.
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// Connected and receiving events.
    Connected,
    /// Connection lost, a retry is scheduled.
    Reconnecting,
    /// Retries exhausted; manual action is required.
    Abandoned,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Describes an established connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    /// Endpoint URL with the token redacted.
    pub url: String,
    /// Generation number of the physical link.
    pub generation: u64,
    pub connected_at: DateTime<Utc>,
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub queued: usize,
    /// Last endpoint URL used, token redacted.
    pub url: Option<String>,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
}

type Waiter = oneshot::Sender<CixResult<ConnectionInfo>>;

/// Result of giving up: the final attempt count and the callers to fail.
struct Abandoned {
    attempts: u32,
    waiters: Vec<Waiter>,
}

struct Shared {
    state: ConnectionState,
    reconnect: ReconnectConfig,
    keepalive: KeepaliveConfig,
    /// Bumped for every open attempt and by `disconnect`.
    generation: u64,
    /// Bumped by `disconnect`; retries scheduled before it are void.
    epoch: u64,
    /// Bumped whenever a scheduled retry is superseded.
    retry_seq: u64,
    attempts: u32,
    base_url: Option<String>,
    /// Full URL (token included) of the last attempt; retries reuse it.
    last_url: Option<String>,
    writer: Option<mpsc::UnboundedSender<Outgoing>>,
    info: Option<ConnectionInfo>,
    queue: OutboundQueue,
    /// Callers of `connect` waiting on the in-flight attempt.
    pending: Vec<Waiter>,
    /// Callers of `wait_for_connection`.
    ready_waiters: Vec<Waiter>,
    last_pong: Option<DateTime<Utc>>,
    link_tasks: Vec<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    dispatcher: Dispatcher,
    state_tx: watch::Sender<ConnectionState>,
    shared: Mutex<Shared>,
}

/// Real-time connection manager.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a new ConnectionManager.
    pub fn new(
        transport: impl Transport,
        tokens: impl TokenProvider,
        dispatcher: Dispatcher,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(Inner {
                transport: Arc::new(transport),
                tokens: Arc::new(tokens),
                dispatcher,
                state_tx,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    reconnect: ReconnectConfig::default(),
                    keepalive: KeepaliveConfig::default(),
                    generation: 0,
                    epoch: 0,
                    retry_seq: 0,
                    attempts: 0,
                    base_url: None,
                    last_url: None,
                    writer: None,
                    info: None,
                    queue: OutboundQueue::new(),
                    pending: Vec::new(),
                    ready_waiters: Vec::new(),
                    last_pong: None,
                    link_tasks: Vec::new(),
                    retry_task: None,
                }),
            }),
        }
    }

    /// Build a manager from the application config: token sources from
    /// `[server]`, reconnect and keepalive tuning from `[realtime]`.
    pub fn from_config(config: &AppConfig, transport: impl Transport, notifier: Notifier) -> Self {
        Self::new(
            transport,
            TokenChain::from_config(&config.server),
            Dispatcher::new(notifier),
        )
        .with_reconnect_config(ReconnectConfig::from(&config.realtime))
        .with_keepalive_config(KeepaliveConfig::from(&config.realtime))
    }

    /// Set custom reconnection configuration.
    pub fn with_reconnect_config(self, config: ReconnectConfig) -> Self {
        self.inner.lock().reconnect = config;
        self
    }

    /// Set custom keepalive configuration.
    pub fn with_keepalive_config(self, config: KeepaliveConfig) -> Self {
        self.inner.lock().keepalive = config;
        self
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Consecutive automatic reconnect attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// Base endpoint URL passed to the most recent explicit `connect`.
    pub fn base_url(&self) -> Option<String> {
        self.inner.lock().base_url.clone()
    }

    /// Number of envelopes waiting in the outbound queue.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn status(&self) -> ConnectionStatus {
        let shared = self.inner.lock();
        ConnectionStatus {
            state: shared.state,
            reconnect_attempts: shared.attempts,
            max_reconnect_attempts: shared.reconnect.max_attempts,
            queued: shared.queue.len(),
            url: shared.last_url.as_deref().map(token::redact),
            connected_since: shared.info.as_ref().map(|info| info.connected_at),
            last_pong: shared.last_pong,
        }
    }

    /// Get the dispatcher (for subscribing to events).
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Connect to `url`, appending the current token.
    ///
    /// Joins the in-flight attempt if one exists and returns immediately if
    /// already connected. An open failure is returned to every caller
    /// waiting on the attempt; the retry is scheduled separately.
    pub async fn connect(&self, url: &str) -> CixResult<ConnectionInfo> {
        let full_url = token::with_token(url, self.inner.tokens.token().as_deref())?;

        let rx = {
            let mut guard = self.inner.lock();
            let shared = &mut *guard;
            if shared.state == ConnectionState::Connected {
                if let Some(info) = shared.info.clone() {
                    debug!("connect called while connected");
                    return Ok(info);
                }
            }

            let (tx, rx) = oneshot::channel();
            shared.pending.push(tx);
            if shared.state == ConnectionState::Connecting {
                debug!("connect joined the in-flight attempt");
            } else {
                shared.base_url = Some(url.to_string());
                self.inner.begin_attempt(shared, full_url);
            }
            rx
        };

        rx.await.unwrap_or(Err(CixError::ConnectionClosed))
    }

    /// Wait until the manager is connected.
    ///
    /// Fails with `ReconnectAbandoned` if the manager gives up first.
    pub async fn wait_for_connection(&self) -> CixResult<ConnectionInfo> {
        let rx = {
            let mut shared = self.inner.lock();
            match shared.state {
                ConnectionState::Connected => {
                    if let Some(info) = shared.info.clone() {
                        return Ok(info);
                    }
                }
                ConnectionState::Abandoned => {
                    return Err(CixError::ReconnectAbandoned {
                        attempts: shared.attempts,
                    })
                }
                _ => {}
            }
            let (tx, rx) = oneshot::channel();
            shared.ready_waiters.push(tx);
            rx
        };

        rx.await.unwrap_or(Err(CixError::ConnectionClosed))
    }

    /// Close the link with a normal closure and stop reconnecting.
    ///
    /// Pending `connect` callers fail with `ConnectCancelled`; queued
    /// messages are kept for the next connect. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let (writer, tasks, retry, pending, previous) = {
            let mut guard = self.inner.lock();
            let shared = &mut *guard;
            shared.epoch += 1;
            shared.generation += 1;
            shared.retry_seq += 1;
            shared.attempts = 0;
            shared.info = None;
            let previous = shared.state;
            self.inner.set_state(shared, ConnectionState::Disconnected);
            (
                shared.writer.take(),
                std::mem::take(&mut shared.link_tasks),
                shared.retry_task.take(),
                std::mem::take(&mut shared.pending),
                previous,
            )
        };

        if let Some(writer) = writer {
            let _ = writer.send(Outgoing::Close {
                code: close_code::NORMAL,
                reason: "client disconnect".to_string(),
            });
        }
        for task in tasks {
            task.abort();
        }
        if let Some(task) = retry {
            task.abort();
        }
        for waiter in pending {
            let _ = waiter.send(Err(CixError::ConnectCancelled));
        }

        if previous != ConnectionState::Disconnected {
            info!("disconnected (was {previous})");
        }
    }

    /// Send an envelope of type `kind`.
    ///
    /// Returns `true` if it was handed to the link writer now, `false` if it
    /// was queued for the next connect. A `true` frame can still be lost if
    /// the socket dies before the writer flushes it.
    pub fn send(&self, kind: &str, data: Value) -> bool {
        self.send_with(kind, data, Map::new())
    }

    /// Like [`send`](Self::send), with extra top-level envelope fields.
    pub fn send_with(&self, kind: &str, data: Value, extra: Map<String, Value>) -> bool {
        let envelope = Envelope::outbound(kind, data, extra);
        let mut shared = self.inner.lock();
        if shared.state == ConnectionState::Connected {
            if let Some(writer) = shared.writer.as_ref() {
                if transmit(writer, &envelope) {
                    return true;
                }
                warn!("link writer closed, queueing '{kind}'");
            }
        }
        shared.queue.push(envelope);
        debug!("queued '{kind}' ({} waiting)", shared.queue.len());
        false
    }

    /// Register a handler under `key` (an event type or `sync:{collection}`).
    pub fn subscribe<F>(&self, key: impl Into<EventKey>, handler: F) -> Subscription
    where
        F: Fn(&Delivery) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(key, handler)
    }

    /// Register a handler for an application event type.
    pub fn on_event<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_event(event_type, handler)
    }

    /// Register a handler for sync messages on one collection.
    pub fn on_sync<F>(&self, collection: &str, handler: F) -> Subscription
    where
        F: Fn(&SyncMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.on_sync(collection, handler)
    }

    /// Deliveries for `key` as a channel.
    pub fn subscribe_channel(
        &self,
        key: impl Into<EventKey>,
    ) -> (Subscription, mpsc::UnboundedReceiver<Delivery>) {
        self.inner.dispatcher.subscribe_channel(key)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Update the connection state and notify watchers.
    fn set_state(&self, shared: &mut Shared, new_state: ConnectionState) {
        if shared.state != new_state {
            info!("connection state: {} -> {}", shared.state, new_state);
            shared.state = new_state;
            self.state_tx.send_replace(new_state);
        }
    }

    /// Start a new open attempt for `url`. The caller holds the lock.
    fn begin_attempt(self: &Arc<Self>, shared: &mut Shared, url: String) {
        shared.generation += 1;
        shared.retry_seq += 1;
        let generation = shared.generation;
        shared.last_url = Some(url.clone());
        self.set_state(shared, ConnectionState::Connecting);
        info!("connecting to {} (attempt generation {generation})", token::redact(&url));

        let weak = Arc::downgrade(self);
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let result = transport.open(&url).await;
            match weak.upgrade() {
                Some(inner) => inner.on_open_result(generation, &url, result),
                None => {
                    if let Ok(link) = result {
                        let _ = link.outgoing.send(close_normal("client dropped"));
                    }
                }
            }
        });
    }

    fn on_open_result(self: &Arc<Self>, generation: u64, url: &str, result: CixResult<TransportLink>) {
        let mut guard = self.lock();
        let shared = &mut *guard;
        if shared.generation != generation || shared.state != ConnectionState::Connecting {
            debug!("discarding result of superseded open attempt");
            if let Ok(link) = result {
                let _ = link.outgoing.send(close_normal("superseded attempt"));
            }
            return;
        }

        match result {
            Ok(TransportLink { outgoing, incoming }) => {
                let info = ConnectionInfo {
                    url: token::redact(url),
                    generation,
                    connected_at: Utc::now(),
                };
                shared.attempts = 0;
                shared.last_pong = None;
                shared.info = Some(info.clone());
                self.set_state(shared, ConnectionState::Connected);

                // Flush before releasing the lock so no `send` can overtake the queue.
                let flushed = shared.queue.drain_with(|envelope| transmit(&outgoing, envelope));
                shared.writer = Some(outgoing);

                let reader = tokio::spawn(reader_loop(Arc::downgrade(self), generation, incoming));
                let keepalive = tokio::spawn(keepalive_loop(
                    Arc::downgrade(self),
                    generation,
                    shared.keepalive.interval,
                ));
                shared.link_tasks = vec![reader, keepalive];

                let waiters: Vec<Waiter> = shared
                    .pending
                    .drain(..)
                    .chain(shared.ready_waiters.drain(..))
                    .collect();
                drop(guard);

                info!("connected to {} ({flushed} queued message(s) flushed)", info.url);
                for waiter in waiters {
                    let _ = waiter.send(Ok(info.clone()));
                }
            }
            Err(e) => {
                warn!("connection attempt failed: {e}");
                let reason = e.to_string();
                let pending = std::mem::take(&mut shared.pending);
                // Leave `Connecting` before any caller can observe the failure.
                let abandoned = self.close_locked(
                    shared,
                    CloseSignal::Abnormal {
                        code: None,
                        reason: reason.clone(),
                    },
                );
                drop(guard);

                for waiter in pending {
                    let _ = waiter.send(Err(CixError::ConnectFailed(reason.clone())));
                }
                if let Some(abandoned) = abandoned {
                    self.announce_abandoned(abandoned);
                }
            }
        }
    }

    fn on_frame(&self, generation: u64, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("dropping inbound frame: {e}");
                return;
            }
        };

        {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            if matches!(envelope.payload, Payload::Pong) {
                shared.last_pong = Some(Utc::now());
            }
        }

        self.dispatcher.dispatch(&envelope);
    }

    fn on_closed(self: &Arc<Self>, generation: u64, signal: CloseSignal) {
        let mut guard = self.lock();
        if guard.generation != generation {
            debug!("ignoring close of superseded connection");
            return;
        }
        let abandoned = self.close_locked(&mut guard, signal);
        drop(guard);

        if let Some(abandoned) = abandoned {
            self.announce_abandoned(abandoned);
        }
    }

    /// Tear down the current link and move to the post-close state. The
    /// caller holds the lock and must pass the result to `announce_abandoned`
    /// after releasing it.
    fn close_locked(self: &Arc<Self>, shared: &mut Shared, signal: CloseSignal) -> Option<Abandoned> {
        shared.writer = None;
        shared.info = None;
        for task in shared.link_tasks.drain(..) {
            task.abort();
        }

        match signal {
            CloseSignal::Normal => {
                info!("connection closed normally");
                self.set_state(shared, ConnectionState::Disconnected);
                None
            }
            CloseSignal::Abnormal { code, reason } => {
                match code {
                    Some(code) => warn!("connection lost (code {code}): {reason}"),
                    None => warn!("connection lost: {reason}"),
                }
                // Straight to `Reconnecting` or `Abandoned`; watchers never see `Disconnected` here.
                self.schedule_reconnect(shared)
            }
        }
    }

    /// Show the durable notice and fail everyone still waiting.
    fn announce_abandoned(&self, abandoned: Abandoned) {
        let Abandoned { attempts, waiters } = abandoned;
        let notifier = self.dispatcher.notifier();
        notifier.show(notifier.policy().for_abandoned(attempts));
        for waiter in waiters {
            let _ = waiter.send(Err(CixError::ReconnectAbandoned { attempts }));
        }
    }

    /// Schedule the next retry, or give up once `max_attempts` retries have
    /// failed. A ceiling of 0 gives up on the first failure.
    fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared) -> Option<Abandoned> {
        let max = shared.reconnect.max_attempts;
        if shared.attempts >= max {
            error!(
                "max reconnection attempts ({max}) reached, real-time updates stopped"
            );
            self.set_state(shared, ConnectionState::Abandoned);
            let waiters = shared
                .pending
                .drain(..)
                .chain(shared.ready_waiters.drain(..))
                .collect();
            return Some(Abandoned {
                attempts: shared.attempts,
                waiters,
            });
        }

        shared.attempts += 1;
        shared.retry_seq += 1;
        let attempt = shared.attempts;
        let delay = shared.reconnect.delay_for(attempt);
        let (epoch, seq) = (shared.epoch, shared.retry_seq);
        self.set_state(shared, ConnectionState::Reconnecting);
        warn!(
            "reconnection attempt {attempt} in {:.1}s",
            delay.as_secs_f64()
        );

        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_retry(epoch, seq);
            }
        });
        if let Some(old) = shared.retry_task.replace(task) {
            old.abort();
        }
        None
    }

    fn fire_retry(self: &Arc<Self>, epoch: u64, seq: u64) {
        let mut guard = self.lock();
        let shared = &mut *guard;
        if shared.epoch != epoch || shared.retry_seq != seq {
            debug!("stale reconnect timer ignored");
            return;
        }
        if shared.state != ConnectionState::Reconnecting {
            debug!("reconnect skipped: state is {}", shared.state);
            return;
        }
        shared.retry_task = None;

        match shared.last_url.clone() {
            Some(url) => self.begin_attempt(shared, url),
            None => self.set_state(shared, ConnectionState::Disconnected),
        }
    }

    /// Send a keepalive ping. Returns false once the link is gone.
    fn send_ping(&self, generation: u64) -> bool {
        let shared = self.lock();
        if shared.generation != generation || shared.state != ConnectionState::Connected {
            return false;
        }
        let Some(writer) = shared.writer.as_ref() else {
            return false;
        };
        let ping = Envelope::outbound(message_type::PING, Value::Object(Map::new()), Map::new());
        debug!("sending keepalive ping");
        transmit(writer, &ping)
    }
}

/// Hand an envelope to the link writer. Returns false only if the writer is closed.
fn transmit(writer: &mpsc::UnboundedSender<Outgoing>, envelope: &Envelope) -> bool {
    match envelope.encode() {
        Ok(text) => writer.send(Outgoing::Text(text)).is_ok(),
        Err(e) => {
            warn!("dropping unencodable '{}' envelope: {e}", envelope.kind());
            true
        }
    }
}

fn close_normal(reason: &str) -> Outgoing {
    Outgoing::Close {
        code: close_code::NORMAL,
        reason: reason.to_string(),
    }
}

async fn reader_loop(weak: Weak<Inner>, generation: u64, mut incoming: mpsc::UnboundedReceiver<Incoming>) {
    let signal = loop {
        match incoming.recv().await {
            Some(Incoming::Text(text)) => match weak.upgrade() {
                Some(inner) => inner.on_frame(generation, &text),
                None => return,
            },
            Some(Incoming::Closed(signal)) => break signal,
            None => break CloseSignal::from_code(None, "link dropped"),
        }
    };
    if let Some(inner) = weak.upgrade() {
        inner.on_closed(generation, signal);
    }
}

async fn keepalive_loop(weak: Weak<Inner>, generation: u64, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if !inner.send_ping(generation) {
            return;
        }
    }
}
