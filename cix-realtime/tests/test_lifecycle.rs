//! Connection lifecycle integration tests.
//!
//! Drives the connection manager over the in-memory transport with a paused
//! clock: connect/disconnect, at-most-one open attempt, backoff growth, the
//! attempt ceiling, keepalive, and the outbound queue.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use cix_core::CixError;
use cix_realtime::{
    ConnectionManager, ConnectionState, Dispatcher, MemoryTransport, NoToken, Outgoing,
    ReconnectConfig,
};

use common::URL;

fn elapsed_between_opens(transport: &MemoryTransport) -> Vec<Duration> {
    let opens: Vec<Instant> = transport.opens().iter().map(|o| o.at).collect();
    opens.windows(2).map(|w| w[1] - w[0]).collect()
}

// ---- Connect / disconnect ----

#[tokio::test(start_paused = true)]
async fn connect_appends_token_and_reports_redacted_url() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);

    let peer = common::connect_with_peer(&manager, &transport).await;
    assert_eq!(peer.url, "ws://localhost:8000/ws?token=test-token");
    assert!(manager.is_connected());

    let status = manager.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.url.as_deref(), Some("ws://localhost:8000/ws?token=***"));
    assert!(status.connected_since.is_some());
}

#[tokio::test(start_paused = true)]
async fn connect_without_token_uses_bare_url() {
    let transport = MemoryTransport::new();
    let manager = ConnectionManager::new(transport.clone(), NoToken, Dispatcher::default());

    manager.connect(URL).await.unwrap();
    let peer = transport.next_peer().await.unwrap();
    assert_eq!(peer.url, URL);
}

#[tokio::test(start_paused = true)]
async fn concurrent_connects_open_a_single_link() {
    let transport = MemoryTransport::new();
    transport.set_open_delay(Duration::from_millis(100));
    let (manager, _sink) = common::create_test_manager(&transport);
    let other = manager.clone();

    let (a, b) = tokio::join!(manager.connect(URL), other.connect(URL));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(transport.open_count(), 1);
    assert_eq!(a.generation, b.generation);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_closes_normally_and_never_reconnects() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let mut peer = common::connect_with_peer(&manager, &transport).await;

    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.is_connected());
    assert_eq!(
        peer.recv().await,
        Some(Outgoing::Close {
            code: 1000,
            reason: "client disconnect".into()
        })
    );

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // Idempotent.
    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_connecting_cancels_pending_callers() {
    let transport = MemoryTransport::new();
    transport.set_open_delay(Duration::from_secs(1));
    let (manager, _sink) = common::create_test_manager(&transport);

    let connecting = manager.clone();
    let handle = tokio::spawn(async move { connecting.connect(URL).await });
    common::settle().await;
    assert_eq!(manager.state(), ConnectionState::Connecting);

    manager.disconnect();
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(CixError::ConnectCancelled)));

    // The late link is closed instead of adopted.
    let mut peer = transport.next_peer().await.unwrap();
    assert!(matches!(peer.recv().await, Some(Outgoing::Close { code: 1000, .. })));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn server_normal_close_does_not_reconnect() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;

    peer.close(Some(1000));
    common::settle().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.open_count(), 1);
}

// ---- Reconnect and backoff ----

#[tokio::test(start_paused = true)]
async fn abnormal_close_schedules_retry_with_backoff() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;

    peer.close(Some(1006));
    common::settle().await;
    assert_eq!(manager.state(), ConnectionState::Reconnecting);
    assert_eq!(manager.reconnect_attempts(), 1);

    let info = manager.wait_for_connection().await.unwrap();
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(transport.open_count(), 2);
    assert_eq!(elapsed_between_opens(&transport), vec![Duration::from_secs(2)]);

    // Retries reuse the full URL of the previous attempt.
    let retried = transport.next_peer().await.unwrap();
    assert_eq!(retried.url, "ws://localhost:8000/ws?token=test-token");
    assert_eq!(info.url, "ws://localhost:8000/ws?token=***");
}

#[tokio::test(start_paused = true)]
async fn backoff_delay_doubles_per_failed_attempt_up_to_cap() {
    let transport = MemoryTransport::new();
    let reconnect = ReconnectConfig {
        max_attempts: 6,
        ..ReconnectConfig::default()
    };
    let (manager, _sink) = common::create_test_manager_with(&transport, reconnect);
    let peer = common::connect_with_peer(&manager, &transport).await;

    transport.refuse_next(6);
    peer.close(Some(1006));
    common::settle().await;

    let err = manager.wait_for_connection().await.unwrap_err();
    assert!(matches!(err, CixError::ReconnectAbandoned { attempts: 6 }));

    let expected: Vec<Duration> = (1..=6u32)
        .map(|n| Duration::from_millis((1000u64 << n).min(30_000)))
        .collect();
    assert_eq!(elapsed_between_opens(&transport), expected);
}

#[tokio::test(start_paused = true)]
async fn three_abnormal_closes_then_success_resets_attempts() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;

    // One dropped link followed by two refused retries; the third retry succeeds.
    transport.refuse_next(2);
    peer.close(Some(1006));
    common::settle().await;

    let mut states = manager.state_receiver();
    let mut max_attempts_seen = manager.reconnect_attempts();
    while manager.state() != ConnectionState::Connected {
        states.changed().await.unwrap();
        max_attempts_seen = max_attempts_seen.max(manager.reconnect_attempts());
    }

    assert_eq!(max_attempts_seen, 3);
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(transport.open_count(), 4);
    assert_eq!(
        elapsed_between_opens(&transport),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn ceiling_abandons_and_stops_scheduling() {
    let transport = MemoryTransport::new();
    let reconnect = ReconnectConfig {
        max_attempts: 3,
        ..ReconnectConfig::default()
    };
    let (manager, sink) = common::create_test_manager_with(&transport, reconnect);
    transport.refuse_next(100);

    let err = manager.connect(URL).await.unwrap_err();
    assert!(matches!(err, CixError::ConnectFailed(_)));

    let err = manager.wait_for_connection().await.unwrap_err();
    assert!(matches!(err, CixError::ReconnectAbandoned { attempts: 3 }));
    assert_eq!(manager.state(), ConnectionState::Abandoned);
    assert_eq!(transport.open_count(), 4);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.open_count(), 4);
    assert_eq!(manager.state(), ConnectionState::Abandoned);

    let notices = sink.notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].is_durable());
    assert!(notices[0].audible);

    // Waiting on an abandoned manager fails immediately.
    assert!(manager.wait_for_connection().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn zero_ceiling_abandons_on_first_failure() {
    let transport = MemoryTransport::new();
    let reconnect = ReconnectConfig {
        max_attempts: 0,
        ..ReconnectConfig::default()
    };
    let (manager, sink) = common::create_test_manager_with(&transport, reconnect);
    transport.refuse_next(1);

    let err = manager.connect(URL).await.unwrap_err();
    assert!(matches!(err, CixError::ConnectFailed(_)));
    assert_eq!(manager.state(), ConnectionState::Abandoned);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(sink.notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_leaves_connecting_before_returning() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    transport.refuse_next(1);

    assert!(manager.connect(URL).await.is_err());
    assert_eq!(manager.state(), ConnectionState::Reconnecting);
    assert_eq!(manager.reconnect_attempts(), 1);

    // A connect issued right after the failure starts its own attempt.
    let info = manager.connect(URL).await.unwrap();
    assert_eq!(info.generation, 2);
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn connect_joining_the_last_retry_fails_when_abandoned() {
    let transport = MemoryTransport::new();
    let reconnect = ReconnectConfig {
        max_attempts: 1,
        ..ReconnectConfig::default()
    };
    let (manager, _sink) = common::create_test_manager_with(&transport, reconnect);
    transport.set_open_delay(Duration::from_millis(500));
    transport.refuse_next(2);

    assert!(manager.connect(URL).await.is_err());
    assert_eq!(manager.state(), ConnectionState::Reconnecting);

    // The retry opens 2s later and stays in flight for 500ms.
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(manager.state(), ConnectionState::Connecting);

    let joined = tokio::time::timeout(Duration::from_secs(60), manager.connect(URL))
        .await
        .expect("joined connect must resolve");
    assert!(joined.is_err());
    assert_eq!(manager.state(), ConnectionState::Abandoned);
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_backoff_cancels_retry() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;

    peer.close(Some(1006));
    common::settle().await;
    assert_eq!(manager.state(), ConnectionState::Reconnecting);

    manager.disconnect();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn stale_retry_does_not_open_after_fresh_connect() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;

    peer.close(Some(1006));
    common::settle().await;
    manager.disconnect();
    let _fresh = common::connect_with_peer(&manager, &transport).await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

// ---- Outbound queue ----

#[tokio::test(start_paused = true)]
async fn queued_send_is_delivered_once_after_connect() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);

    assert!(!manager.send("threat", json!({"id": 1})));
    assert_eq!(manager.queued(), 1);

    let mut peer = common::connect_with_peer(&manager, &transport).await;
    let frames = peer.drain_json();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "threat");
    assert_eq!(frames[0]["data"], json!({"id": 1}));
    assert!(frames[0]["id"].is_string());
    assert!(frames[0]["timestamp"].is_string());
    assert_eq!(manager.queued(), 0);
}

#[tokio::test(start_paused = true)]
async fn queued_sends_flush_in_order_before_new_sends() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);

    for i in 1..=20 {
        assert!(!manager.send("alert", json!({ "seq": i })));
    }
    let mut peer = common::connect_with_peer(&manager, &transport).await;
    assert!(manager.send("alert", json!({ "seq": 21 })));

    let seqs: Vec<i64> = peer
        .drain_json()
        .iter()
        .map(|f| f["data"]["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, (1..=21).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn sends_during_backoff_are_flushed_after_reconnect() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;

    peer.close(Some(1006));
    common::settle().await;
    assert!(!manager.send("report", json!({"id": "r-1"})));

    manager.wait_for_connection().await.unwrap();
    let mut second = transport.next_peer().await.unwrap();
    let frame = common::recv_frame(&mut second, "report").await;
    assert_eq!(frame["data"]["id"], "r-1");
}

#[tokio::test(start_paused = true)]
async fn send_with_adds_top_level_fields() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let mut peer = common::connect_with_peer(&manager, &transport).await;

    let mut extra = serde_json::Map::new();
    extra.insert("channels".into(), json!(["alerts"]));
    extra.insert("type".into(), json!("ignored"));
    assert!(manager.send_with("subscribe", serde_json::Value::Null, extra));

    let frame = common::recv_frame(&mut peer, "subscribe").await;
    assert_eq!(frame["channels"], json!(["alerts"]));
}

// ---- Keepalive and inbound robustness ----

#[tokio::test(start_paused = true)]
async fn keepalive_pings_every_interval_and_tracks_pong() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let mut peer = common::connect_with_peer(&manager, &transport).await;
    let start = Instant::now();

    common::recv_frame(&mut peer, "ping").await;
    assert_eq!(start.elapsed(), Duration::from_secs(30));
    common::recv_frame(&mut peer, "ping").await;
    assert_eq!(start.elapsed(), Duration::from_secs(60));

    assert!(manager.status().last_pong.is_none());
    peer.push_json(&json!({"type": "pong"}));
    common::settle().await;
    assert!(manager.status().last_pong.is_some());
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped_without_closing() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;
    let (_sub, mut rx) = manager.subscribe_channel("threat");

    peer.push_text("not json");
    peer.push_text(r#"{"data": {"missing": "type"}}"#);
    peer.push_json(&json!({"type": "sync", "data": {"collection": "threats"}}));
    peer.push_json(&json!({"type": "threat", "data": {"id": 9}}));

    let delivery = rx.recv().await.unwrap();
    assert_eq!(delivery.data()["id"], 9);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn frame_accepted_by_a_dying_link_is_not_requeued() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;

    // Accepted by the writer, then the socket dies before the peer reads it.
    assert!(manager.send("report", json!({"id": "r-1"})));
    peer.close(Some(1006));
    drop(peer);
    common::settle().await;
    assert_eq!(manager.queued(), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    let mut peer = transport.next_peer().await.unwrap();
    assert!(peer.drain_json().iter().all(|f| f["type"] != "report"));
}
