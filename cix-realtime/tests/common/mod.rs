//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cix_core::CixResult;
use cix_realtime::{
    ConnectionManager, Dispatcher, MemoryPeer, MemoryTransport, Notice, NotificationPolicy,
    NotificationSink, Notifier, ReconnectConfig, StaticToken,
};

/// Base endpoint used by every test.
pub const URL: &str = "ws://localhost:8000/ws";

/// Notification sink that records every notice it is asked to present.
#[derive(Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn present(&self, notice: &Notice) -> CixResult<()> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// Create a manager over the given in-memory transport with default reconnect settings.
pub fn create_test_manager(transport: &MemoryTransport) -> (ConnectionManager, Arc<RecordingSink>) {
    create_test_manager_with(transport, ReconnectConfig::default())
}

/// Create a manager with custom reconnect settings.
pub fn create_test_manager_with(
    transport: &MemoryTransport,
    reconnect: ReconnectConfig,
) -> (ConnectionManager, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let notifier = Notifier::new(sink.clone(), NotificationPolicy::default());
    let manager = ConnectionManager::new(
        transport.clone(),
        StaticToken::new("test-token"),
        Dispatcher::new(notifier),
    )
    .with_reconnect_config(reconnect);
    (manager, sink)
}

/// Connect and return the server side of the new link.
pub async fn connect_with_peer(manager: &ConnectionManager, transport: &MemoryTransport) -> MemoryPeer {
    manager.connect(URL).await.expect("connect should succeed");
    transport.next_peer().await.expect("transport should hand out a peer")
}

/// Wait for the next text frame of the given type, skipping keepalive pings.
pub async fn recv_frame(peer: &mut MemoryPeer, kind: &str) -> serde_json::Value {
    loop {
        let text = peer.recv_text().await.expect("link closed before frame arrived");
        let frame: serde_json::Value = serde_json::from_str(&text).expect("frame should be JSON");
        if frame["type"] == kind {
            return frame;
        }
    }
}

/// Let spawned tasks run without advancing time.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
