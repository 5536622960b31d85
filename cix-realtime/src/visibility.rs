//! Foreground/background trigger for opportunistic reconnects.
//!
//! When the host comes back to the foreground (or on initial load) and the
//! manager is not connected, a connect is started. It joins any attempt
//! already in flight and leaves the reconnect attempt counter alone.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::manager::ConnectionManager;

/// Host visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Foreground,
    Background,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Foreground => write!(f, "foreground"),
            Self::Background => write!(f, "background"),
        }
    }
}

/// Starts a connect whenever the host becomes visible while disconnected.
#[derive(Clone)]
pub struct VisibilityTrigger {
    manager: ConnectionManager,
    fallback_url: String,
}

impl VisibilityTrigger {
    /// `fallback_url` is used until the manager has been connected explicitly once.
    pub fn new(manager: ConnectionManager, fallback_url: impl Into<String>) -> Self {
        Self {
            manager,
            fallback_url: fallback_url.into(),
        }
    }

    /// Call once when the host finishes loading.
    pub fn on_load(&self) -> bool {
        self.trigger("load")
    }

    /// Call on every visibility change. Returns true if a connect was started.
    pub fn on_visibility(&self, visibility: Visibility) -> bool {
        match visibility {
            Visibility::Foreground => self.trigger("foreground"),
            Visibility::Background => false,
        }
    }

    /// Follow a visibility channel, firing on each background to foreground
    /// transition. The task ends when the sender is dropped.
    pub fn watch(&self, mut visibility: watch::Receiver<Visibility>) -> JoinHandle<()> {
        let trigger = self.clone();
        tokio::spawn(async move {
            let mut previous = *visibility.borrow_and_update();
            while visibility.changed().await.is_ok() {
                let current = *visibility.borrow_and_update();
                if previous == Visibility::Background && current == Visibility::Foreground {
                    trigger.on_visibility(current);
                }
                previous = current;
            }
            debug!("visibility watcher stopped");
        })
    }

    fn trigger(&self, reason: &str) -> bool {
        if self.manager.is_connected() {
            return false;
        }
        let url = self
            .manager
            .base_url()
            .unwrap_or_else(|| self.fallback_url.clone());
        if url.is_empty() {
            debug!("no endpoint known, skipping {reason} reconnect");
            return false;
        }

        info!("{reason}: not connected, starting connect");
        let manager = self.manager.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.connect(&url).await {
                debug!("opportunistic connect failed: {e}");
            }
        });
        true
    }
}
