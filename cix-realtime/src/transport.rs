//! Transport seam between the lifecycle manager and the physical link.
//!
//! A [`Transport`] opens one link per call. The link is a pair of channels:
//! the manager pushes [`Outgoing`] frames in, and the transport reports
//! [`Incoming`] text frames and exactly one terminal [`CloseSignal`].
//!
//! Two implementations ship with the crate:
//! - [`WsTransport`]: WebSocket over tokio-tungstenite
//! - [`MemoryTransport`]: in-process and scriptable, for tests and demos

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use cix_core::constants::close_code;
use cix_core::error::{CixError, CixResult};

/// A frame the manager wants written to the link.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// A JSON text frame.
    Text(String),
    /// Close the link with the given code.
    Close { code: u16, reason: String },
}

/// How a link ended, classified at the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseSignal {
    /// Normal closure (code 1000). Never triggers a reconnect.
    Normal,
    /// Any other code, or no close frame at all.
    Abnormal { code: Option<u16>, reason: String },
}

impl CloseSignal {
    /// Classify a close code. Only 1000 is a normal closure.
    pub fn from_code(code: Option<u16>, reason: impl Into<String>) -> Self {
        match code {
            Some(close_code::NORMAL) => Self::Normal,
            code => Self::Abnormal {
                code,
                reason: reason.into(),
            },
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }
}

/// Something the link reports back to the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A text frame, not yet decoded.
    Text(String),
    /// The link is gone. Sent at most once, always last.
    Closed(CloseSignal),
}

/// An open link.
#[derive(Debug)]
pub struct TransportLink {
    pub outgoing: mpsc::UnboundedSender<Outgoing>,
    pub incoming: mpsc::UnboundedReceiver<Incoming>,
}

/// Opens physical links to the update channel.
///
/// A frame handed to [`TransportLink::outgoing`] counts as transmitted once
/// the channel accepts it. Frames still buffered when the link dies are lost
/// and are not returned to the outbound queue.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a link to `url`. An `Err` is an open failure.
    async fn open(&self, url: &str) -> CixResult<TransportLink>;
}

// -- WebSocket transport --

/// WebSocket transport backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(cix_core::constants::DEFAULT_CONNECT_TIMEOUT_MS))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> CixResult<TransportLink> {
        let (ws, response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| CixError::ConnectTimeout(self.connect_timeout.as_millis() as u64))?
                .map_err(|e| CixError::Transport(e.to_string()))?;
        debug!("websocket handshake complete (status {})", response.status());

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Incoming>();

        tokio::spawn(async move {
            let signal = loop {
                tokio::select! {
                    cmd = out_rx.recv() => match cmd {
                        Some(Outgoing::Text(text)) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                break CloseSignal::from_code(None, e.to_string());
                            }
                        }
                        Some(Outgoing::Close { code, reason }) => {
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.clone().into(),
                            };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                            break CloseSignal::from_code(Some(code), reason);
                        }
                        None => {
                            let _ = sink.close().await;
                            break CloseSignal::Normal;
                        }
                    },
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if in_tx.send(Incoming::Text(text)).is_err() {
                                break CloseSignal::Normal;
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                let _ = in_tx.send(Incoming::Text(text));
                            }
                            Err(_) => warn!("dropping non-utf8 binary frame"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                                .unwrap_or((None, String::new()));
                            break CloseSignal::from_code(code, reason);
                        }
                        // Ping/pong control frames are answered by tungstenite.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break CloseSignal::from_code(None, e.to_string()),
                        None => break CloseSignal::from_code(None, "stream ended"),
                    },
                }
            };
            debug!("websocket pump finished: {signal:?}");
            let _ = in_tx.send(Incoming::Closed(signal));
        });

        Ok(TransportLink {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

// -- In-memory transport --

/// Outcome of the next `open` call on a [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    Accept,
    Refuse(String),
}

/// Record of one `open` call.
#[derive(Debug, Clone)]
pub struct OpenRecord {
    pub url: String,
    pub at: Instant,
}

#[derive(Default)]
struct MemoryState {
    opens: Vec<OpenRecord>,
    script: VecDeque<OpenOutcome>,
    open_delay: Option<Duration>,
}

/// In-process transport. Opens are accepted unless scripted otherwise;
/// each accepted link hands a [`MemoryPeer`] to the test or demo driving it.
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
    peers_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<MemoryPeer>>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            peers_tx,
            peers_rx: Arc::new(tokio::sync::Mutex::new(peers_rx)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the outcome of a future `open` call. Unscripted opens are accepted.
    pub fn script(&self, outcome: OpenOutcome) {
        self.lock().script.push_back(outcome);
    }

    /// Refuse the next `n` opens.
    pub fn refuse_next(&self, n: usize) {
        for i in 0..n {
            self.script(OpenOutcome::Refuse(format!("connection refused ({})", i + 1)));
        }
    }

    /// Make every `open` wait this long before completing.
    pub fn set_open_delay(&self, delay: Duration) {
        self.lock().open_delay = Some(delay);
    }

    /// Number of `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.lock().opens.len()
    }

    /// All `open` calls so far.
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.lock().opens.clone()
    }

    /// Wait for the next accepted link.
    pub async fn next_peer(&self) -> Option<MemoryPeer> {
        self.peers_rx.lock().await.recv().await
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> CixResult<TransportLink> {
        let delay = {
            let mut state = self.lock();
            state.opens.push(OpenRecord {
                url: url.to_string(),
                at: Instant::now(),
            });
            state.open_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.lock().script.pop_front().unwrap_or(OpenOutcome::Accept);
        match outcome {
            OpenOutcome::Refuse(reason) => Err(CixError::Transport(reason)),
            OpenOutcome::Accept => {
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                let (in_tx, in_rx) = mpsc::unbounded_channel();
                let peer = MemoryPeer {
                    url: url.to_string(),
                    sent: out_rx,
                    inbound: in_tx,
                };
                self.peers_tx
                    .send(peer)
                    .map_err(|_| CixError::Transport("memory transport dropped".into()))?;
                Ok(TransportLink {
                    outgoing: out_tx,
                    incoming: in_rx,
                })
            }
        }
    }
}

/// Server side of a [`MemoryTransport`] link.
pub struct MemoryPeer {
    /// Full URL the client opened, token included.
    pub url: String,
    sent: mpsc::UnboundedReceiver<Outgoing>,
    inbound: mpsc::UnboundedSender<Incoming>,
}

impl MemoryPeer {
    /// Deliver a text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Incoming::Text(text.into()));
    }

    /// Deliver a JSON value as a text frame.
    pub fn push_json(&self, value: &serde_json::Value) {
        self.push_text(value.to_string());
    }

    /// Close the link with a code (`None` simulates a dropped connection).
    pub fn close(&self, code: Option<u16>) {
        let _ = self
            .inbound
            .send(Incoming::Closed(CloseSignal::from_code(code, "closed by peer")));
    }

    /// Wait for the next frame the client wrote.
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.sent.recv().await
    }

    /// Take a frame the client already wrote, if any.
    pub fn try_recv(&mut self) -> Option<Outgoing> {
        self.sent.try_recv().ok()
    }

    /// Wait for the next text frame, skipping close commands.
    pub async fn recv_text(&mut self) -> Option<String> {
        while let Some(frame) = self.sent.recv().await {
            if let Outgoing::Text(text) = frame {
                return Some(text);
            }
        }
        None
    }

    /// Drain every text frame already written, decoded as JSON.
    pub fn drain_json(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_recv() {
            if let Outgoing::Text(text) = frame {
                if let Ok(value) = serde_json::from_str(&text) {
                    frames.push(value);
                }
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_signal_classification() {
        assert_eq!(CloseSignal::from_code(Some(1000), ""), CloseSignal::Normal);
        assert!(!CloseSignal::from_code(Some(1006), "").is_normal());
        assert!(!CloseSignal::from_code(Some(1001), "").is_normal());
        assert_eq!(
            CloseSignal::from_code(None, "gone"),
            CloseSignal::Abnormal {
                code: None,
                reason: "gone".into()
            }
        );
    }

    #[tokio::test]
    async fn test_memory_transport_accepts_and_links() {
        let transport = MemoryTransport::new();
        let mut link = transport.open("ws://test/ws?token=t").await.unwrap();
        let mut peer = transport.next_peer().await.unwrap();
        assert_eq!(peer.url, "ws://test/ws?token=t");

        link.outgoing.send(Outgoing::Text("hello".into())).unwrap();
        assert_eq!(peer.recv_text().await.as_deref(), Some("hello"));

        peer.push_text("world");
        assert_eq!(link.incoming.recv().await, Some(Incoming::Text("world".into())));

        peer.close(Some(1006));
        assert!(matches!(
            link.incoming.recv().await,
            Some(Incoming::Closed(CloseSignal::Abnormal { code: Some(1006), .. }))
        ));
    }

    #[tokio::test]
    async fn test_memory_transport_scripted_refusal() {
        let transport = MemoryTransport::new();
        transport.refuse_next(1);
        assert!(transport.open("ws://test").await.is_err());
        assert!(transport.open("ws://test").await.is_ok());
        assert_eq!(transport.open_count(), 2);
    }
}
