//! Inbound dispatch integration tests.
//!
//! Frames are pushed from the in-memory server side and observed through
//! subscriptions on the connection manager: handler isolation, sync routing,
//! unsubscribe, ordering, and the built-in notification/error handling.

mod common;

use std::sync::{Arc, Mutex};

use serde_json::json;

use cix_realtime::{Delivery, EventKey, MemoryTransport, NotificationLevel, SyncOperation};

/// Subscribe a marker handler and return its receiver. Pushing a marker frame
/// after the frames under test and awaiting it proves they were dispatched.
fn marker(manager: &cix_realtime::ConnectionManager) -> tokio::sync::mpsc::UnboundedReceiver<Delivery> {
    let (_sub, rx) = manager.subscribe_channel("marker");
    rx
}

// ---- Handler isolation ----

#[tokio::test(start_paused = true)]
async fn failing_handler_does_not_block_later_handlers() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;

    manager.on_event("threat", |_| anyhow::bail!("handler A failed"));
    manager.on_event("threat", |_| panic!("handler B panicked"));
    let (_sub, mut rx) = manager.subscribe_channel("threat");

    peer.push_json(&json!({"type": "threat", "data": {"id": 1}}));
    peer.push_json(&json!({"type": "threat", "data": {"id": 2}}));

    assert_eq!(rx.recv().await.unwrap().data()["id"], 1);
    assert_eq!(rx.recv().await.unwrap().data()["id"], 2);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn handlers_run_in_subscription_order() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;
    let mut done = marker(&manager);

    let order = Arc::new(Mutex::new(Vec::new()));
    for n in 0..5 {
        let order = Arc::clone(&order);
        manager.on_event("alert", move |_| {
            order.lock().unwrap().push(n);
            Ok(())
        });
    }

    peer.push_json(&json!({"type": "alert", "data": {}}));
    peer.push_json(&json!({"type": "marker"}));
    done.recv().await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn inbound_frames_dispatch_in_arrival_order() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;
    let (_sub, mut rx) = manager.subscribe_channel("alert");

    for seq in 0..50 {
        peer.push_json(&json!({"type": "alert", "data": {"seq": seq}}));
    }
    for seq in 0..50 {
        assert_eq!(rx.recv().await.unwrap().data()["seq"], seq);
    }
}

// ---- Sync routing ----

#[tokio::test(start_paused = true)]
async fn sync_goes_only_to_collection_subscribers() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;
    let mut done = marker(&manager);

    let (_a, mut sync_threats) = manager.subscribe_channel("sync:threats");
    let (_b, mut plain_sync) = manager.subscribe_channel("sync");
    let (_c, mut threats) = manager.subscribe_channel("threats");
    let (_d, mut sync_alerts) = manager.subscribe_channel(EventKey::sync("alerts"));

    peer.push_json(&json!({
        "type": "sync",
        "data": {"collection": "threats", "operation": "update", "data": {"id": "t-1", "severity": "high"}}
    }));
    peer.push_json(&json!({"type": "marker"}));
    done.recv().await.unwrap();

    match sync_threats.try_recv().unwrap() {
        Delivery::Sync(sync) => {
            assert_eq!(sync.collection, "threats");
            assert_eq!(sync.operation, SyncOperation::Update);
            assert_eq!(sync.data["severity"], "high");
        }
        other => panic!("expected sync delivery, got {other:?}"),
    }
    assert!(plain_sync.try_recv().is_err());
    assert!(threats.try_recv().is_err());
    assert!(sync_alerts.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn on_sync_receives_delete_with_identifier() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;
    let mut done = marker(&manager);

    let deleted = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&deleted);
    manager.on_sync("reports", move |sync| {
        if sync.operation == SyncOperation::Delete {
            seen.lock().unwrap().push(sync.data.clone());
        }
        Ok(())
    });

    peer.push_json(&json!({
        "type": "sync",
        "data": {"collection": "reports", "operation": "delete", "data": "r-42"}
    }));
    peer.push_json(&json!({"type": "marker"}));
    done.recv().await.unwrap();

    assert_eq!(*deleted.lock().unwrap(), vec![json!("r-42")]);
}

// ---- Unsubscribe ----

#[tokio::test(start_paused = true)]
async fn unsubscribed_handler_is_never_invoked() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;
    let mut done = marker(&manager);

    let removed_calls = Arc::new(Mutex::new(0));
    let kept_calls = Arc::new(Mutex::new(0));

    let counter = Arc::clone(&removed_calls);
    let removed = manager.on_event("threat", move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    let counter = Arc::clone(&kept_calls);
    let _kept = manager.on_event("threat", move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    removed.unsubscribe();
    peer.push_json(&json!({"type": "threat", "data": {}}));
    peer.push_json(&json!({"type": "marker"}));
    done.recv().await.unwrap();

    assert_eq!(*removed_calls.lock().unwrap(), 0);
    assert_eq!(*kept_calls.lock().unwrap(), 1);
    assert_eq!(manager.dispatcher().registry().handler_count(&EventKey::event("threat")), 1);
}

// ---- Built-in handlers ----

#[tokio::test(start_paused = true)]
async fn notification_is_presented_by_builtin_handler() {
    let transport = MemoryTransport::new();
    let (manager, sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;
    let mut done = marker(&manager);
    let (_sub, mut subscribers) = manager.subscribe_channel("notification");

    peer.push_json(&json!({
        "type": "notification",
        "data": {"level": "error", "title": "Critical threat", "content": "Ransomware detected", "action": {"route": "/threats/1"}}
    }));
    peer.push_json(&json!({
        "type": "notification",
        "data": {"level": "success", "title": "Report ready", "content": "Weekly summary"}
    }));
    peer.push_json(&json!({"type": "marker"}));
    done.recv().await.unwrap();

    let notices = sink.notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].level, NotificationLevel::Error);
    assert!(notices[0].audible);
    assert!(notices[0].duration > notices[1].duration);
    assert_eq!(notices[0].action, Some(json!({"route": "/threats/1"})));
    assert!(!notices[1].audible);
    assert!(subscribers.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn server_error_is_transient_and_reaches_error_subscribers() {
    let transport = MemoryTransport::new();
    let (manager, sink) = common::create_test_manager(&transport);
    let peer = common::connect_with_peer(&manager, &transport).await;
    let (_sub, mut errors) = manager.subscribe_channel("error");

    peer.push_json(&json!({"type": "error", "data": {"error": "subscription denied"}}));

    match errors.recv().await.unwrap() {
        Delivery::Error(err) => assert_eq!(err.message, "subscription denied"),
        other => panic!("expected error delivery, got {other:?}"),
    }
    let notices = sink.notices();
    assert_eq!(notices.len(), 1);
    assert!(!notices[0].is_durable());
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn handler_may_send_while_dispatching() {
    let transport = MemoryTransport::new();
    let (manager, _sink) = common::create_test_manager(&transport);
    let mut peer = common::connect_with_peer(&manager, &transport).await;

    let replier = manager.clone();
    manager.on_event("threat", move |data| {
        replier.send("ack", json!({"id": data["id"]}));
        Ok(())
    });

    peer.push_json(&json!({"type": "threat", "data": {"id": 5}}));
    let frame = common::recv_frame(&mut peer, "ack").await;
    assert_eq!(frame["data"]["id"], 5);
}
