//! Subscription registry: event keys to ordered handler lists.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tracing::debug;

use cix_core::constants::message_type;

use crate::envelope::{ErrorMessage, SyncMessage};

/// Key a handler is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// A raw envelope `type` (e.g. `threat`, `error`).
    Type(String),
    /// Sync messages for one collection, written `sync:{collection}`.
    Sync(String),
}

impl EventKey {
    pub fn event(kind: impl Into<String>) -> Self {
        Self::Type(kind.into())
    }

    pub fn sync(collection: impl Into<String>) -> Self {
        Self::Sync(collection.into())
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(kind) => write!(f, "{kind}"),
            Self::Sync(collection) => write!(f, "{}:{collection}", message_type::SYNC),
        }
    }
}

impl From<&str> for EventKey {
    /// Parses `sync:{collection}` into [`EventKey::Sync`]; anything else is a type.
    fn from(s: &str) -> Self {
        match s.strip_prefix("sync:") {
            Some(collection) if !collection.is_empty() => Self::Sync(collection.to_string()),
            _ => Self::Type(s.to_string()),
        }
    }
}

impl From<String> for EventKey {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

/// What a handler receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// An application event; `data` is the envelope's opaque payload.
    Event { event_type: String, data: Value },
    /// A sync message for the subscribed collection.
    Sync(SyncMessage),
    /// A protocol error message.
    Error(ErrorMessage),
}

impl Delivery {
    /// The payload as JSON, whatever the variant.
    pub fn data(&self) -> &Value {
        match self {
            Self::Event { data, .. } => data,
            Self::Sync(sync) => &sync.data,
            Self::Error(err) => &err.data,
        }
    }
}

/// A registered callback. Returning `Err` is logged and isolated.
pub type Handler = Arc<dyn Fn(&Delivery) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    handlers: HashMap<EventKey, Vec<(u64, Handler)>>,
}

/// Maps event keys to handlers in registration order.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a handler. Keep the returned [`Subscription`] to remove it later.
    pub fn subscribe(&self, key: EventKey, handler: Handler) -> Subscription {
        let id = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.handlers.entry(key.clone()).or_default().push((id, handler));
            id
        };
        debug!("subscribed handler #{id} to '{key}'");
        Subscription {
            registry: Arc::downgrade(&self.inner),
            key,
            id,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Snapshot of the handlers for a key, in registration order.
    pub fn handlers(&self, key: &EventKey) -> Vec<Handler> {
        self.lock()
            .handlers
            .get(key)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, key: &EventKey) -> usize {
        self.lock().handlers.get(key).map_or(0, Vec::len)
    }

    /// Keys with at least one handler.
    pub fn keys(&self) -> Vec<EventKey> {
        self.lock().handlers.keys().cloned().collect()
    }
}

fn remove_handler(inner: &Mutex<RegistryInner>, key: &EventKey, id: u64) -> bool {
    let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let Some(list) = inner.handlers.get_mut(key) else {
        return false;
    };
    let before = list.len();
    list.retain(|(handler_id, _)| *handler_id != id);
    let removed = list.len() != before;
    if list.is_empty() {
        inner.handlers.remove(key);
    }
    removed
}

/// Handle to one registered handler.
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
/// Clones refer to the same registration.
#[derive(Clone)]
pub struct Subscription {
    registry: Weak<Mutex<RegistryInner>>,
    key: EventKey,
    id: u64,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn key(&self) -> &EventKey {
        &self.key
    }

    /// Remove exactly this handler. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            if remove_handler(&inner, &self.key, self.id) {
                debug!("unsubscribed handler #{} from '{}'", self.id, self.key);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
