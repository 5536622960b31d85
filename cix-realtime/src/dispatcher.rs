//! Inbound dispatcher.
//!
//! Routes decoded envelopes to the built-in handlers and to registered
//! subscribers. Dispatch is synchronous: every handler for a message has run
//! by the time [`Dispatcher::dispatch`] returns. A handler that returns an
//! error or panics is logged and skipped; the rest still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use cix_core::constants::message_type;

use crate::envelope::{Envelope, Payload};
use crate::notify::Notifier;
use crate::registry::{Delivery, EventKey, Handler, Subscription, SubscriptionRegistry};

/// Owns the subscription registry and the built-in notification handling.
#[derive(Clone)]
pub struct Dispatcher {
    registry: SubscriptionRegistry,
    notifier: Notifier,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Notifier::default())
    }
}

impl Dispatcher {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            notifier,
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Register a handler under `key`.
    pub fn subscribe<F>(&self, key: impl Into<EventKey>, handler: F) -> Subscription
    where
        F: Fn(&Delivery) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.subscribe(key.into(), Arc::new(handler))
    }

    /// Register a handler for an application event type; it receives the
    /// envelope's `data`.
    pub fn on_event<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(EventKey::event(event_type), move |delivery: &Delivery| {
            handler(delivery.data())
        })
    }

    /// Register a handler for sync messages on one collection.
    pub fn on_sync<F>(&self, collection: &str, handler: F) -> Subscription
    where
        F: Fn(&crate::envelope::SyncMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(EventKey::sync(collection), move |delivery: &Delivery| match delivery {
            Delivery::Sync(sync) => handler(sync),
            _ => Ok(()),
        })
    }

    /// Deliveries for `key` as a channel, for task-based consumers.
    ///
    /// The subscription is removed once the receiver is dropped and the next
    /// message for `key` arrives.
    pub fn subscribe_channel(&self, key: impl Into<EventKey>) -> (Subscription, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = key.into();
        let registry = self.registry.clone();
        let slot: Arc<std::sync::OnceLock<Subscription>> = Arc::new(std::sync::OnceLock::new());
        let handler_slot = Arc::clone(&slot);
        let handler: Handler = Arc::new(move |delivery: &Delivery| {
            if tx.send(delivery.clone()).is_err() {
                if let Some(sub) = handler_slot.get() {
                    sub.unsubscribe();
                }
            }
            Ok(())
        });
        let subscription = registry.subscribe(key.clone(), handler);
        // A second handle on the same registration lets the handler remove itself.
        let _ = slot.set(subscription.clone());
        (subscription, rx)
    }

    /// Route one decoded envelope.
    pub fn dispatch(&self, envelope: &Envelope) {
        match &envelope.payload {
            Payload::Pong => trace!("pong received"),
            Payload::Ping(_) => debug!("ignoring server ping"),
            Payload::Error(err) => {
                warn!("server error message: {}", err.message);
                self.notifier.show(self.notifier.policy().for_error(err));
                self.deliver(&EventKey::event(message_type::ERROR), &Delivery::Error(err.clone()));
            }
            Payload::Notification(payload) => {
                self.notifier
                    .show(self.notifier.policy().for_notification(payload));
            }
            Payload::Sync(sync) => {
                self.deliver(&EventKey::sync(&sync.collection), &Delivery::Sync(sync.clone()));
            }
            Payload::Event { event_type, data } => {
                self.deliver(
                    &EventKey::event(event_type),
                    &Delivery::Event {
                        event_type: event_type.clone(),
                        data: data.clone(),
                    },
                );
            }
        }
    }

    fn deliver(&self, key: &EventKey, delivery: &Delivery) {
        let handlers = self.registry.handlers(key);
        if handlers.is_empty() {
            trace!("no subscribers for '{key}'");
            return;
        }

        let mut failed = 0;
        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(delivery))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    warn!("handler for '{key}' failed: {e:#}");
                }
                Err(panic) => {
                    failed += 1;
                    warn!("handler for '{key}' panicked: {}", panic_message(&*panic));
                }
            }
        }
        debug!(
            "dispatched '{key}' to {} handler(s), {failed} failed",
            handlers.len()
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
