//! Server-side channel membership.
//!
//! The server only forwards broadcasts for channels a connection has joined
//! with `{"type":"subscribe","channels":[...]}`, and membership is per
//! connection. [`ChannelSubscriptions`] keeps the wanted set, re-joins it
//! after every (re)connect, and tracks what the server confirmed through
//! `subscription_update` messages.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use cix_core::constants::message_type;

use crate::manager::{ConnectionManager, ConnectionState};
use crate::registry::Subscription;

#[derive(Debug, Default)]
struct ChannelState {
    desired: BTreeSet<String>,
    confirmed: BTreeSet<String>,
}

/// Tracks and maintains channel membership for one connection manager.
///
/// Dropping it stops the re-join task and the `subscription_update` handler.
pub struct ChannelSubscriptions {
    manager: ConnectionManager,
    state: Arc<Mutex<ChannelState>>,
    update_sub: Subscription,
    rejoin_task: JoinHandle<()>,
}

fn lock(state: &Mutex<ChannelState>) -> MutexGuard<'_, ChannelState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn channels_frame(channels: &[String]) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert(
        "channels".to_string(),
        Value::Array(channels.iter().cloned().map(Value::String).collect()),
    );
    extra
}

impl ChannelSubscriptions {
    /// Start tracking membership on `manager`. Must be called inside a tokio runtime.
    pub fn attach(manager: &ConnectionManager) -> Self {
        let state = Arc::new(Mutex::new(ChannelState::default()));

        let handler_state = Arc::clone(&state);
        let update_sub = manager.on_event(message_type::SUBSCRIPTION_UPDATE, move |data| {
            let subscribed = data
                .get("subscribed")
                .and_then(Value::as_array)
                .context("subscription_update without a 'subscribed' list")?;
            let confirmed: BTreeSet<String> = subscribed
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            debug!("server confirmed channels: {confirmed:?}");
            lock(&handler_state).confirmed = confirmed;
            Ok(())
        });

        let mut state_rx = manager.state_receiver();
        let task_manager = manager.clone();
        let task_state = Arc::clone(&state);
        let rejoin_task = tokio::spawn(async move {
            loop {
                let current = *state_rx.borrow_and_update();
                if current == ConnectionState::Connected {
                    let channels: Vec<String> = lock(&task_state).desired.iter().cloned().collect();
                    if !channels.is_empty() {
                        info!("joining {} channel(s) after connect", channels.len());
                        task_manager.send_with(message_type::SUBSCRIBE, Value::Null, channels_frame(&channels));
                    }
                } else {
                    lock(&task_state).confirmed.clear();
                }
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        Self {
            manager: manager.clone(),
            state,
            update_sub,
            rejoin_task,
        }
    }

    /// Add channels to the wanted set. Newly added channels are joined right
    /// away when connected; otherwise they are joined on the next connect.
    ///
    /// Returns true if a `subscribe` frame was sent now.
    pub fn join<I, S>(&self, channels: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let added: Vec<String> = {
            let mut state = lock(&self.state);
            channels
                .into_iter()
                .map(Into::into)
                .filter(|c| !c.is_empty() && state.desired.insert(c.clone()))
                .collect()
        };
        if added.is_empty() || !self.manager.is_connected() {
            return false;
        }
        self.manager
            .send_with(message_type::SUBSCRIBE, Value::Null, channels_frame(&added))
    }

    /// Remove channels from the wanted set, leaving them on the server when connected.
    ///
    /// Returns true if an `unsubscribe` frame was sent now.
    pub fn leave<I, S>(&self, channels: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let removed: Vec<String> = {
            let mut state = lock(&self.state);
            channels
                .into_iter()
                .map(Into::into)
                .filter(|c| state.desired.remove(c))
                .collect()
        };
        if removed.is_empty() || !self.manager.is_connected() {
            return false;
        }
        self.manager
            .send_with(message_type::UNSUBSCRIBE, Value::Null, channels_frame(&removed))
    }

    /// Channels this client wants, sorted.
    pub fn desired(&self) -> Vec<String> {
        lock(&self.state).desired.iter().cloned().collect()
    }

    /// Channels the server last confirmed for the current connection, sorted.
    pub fn confirmed(&self) -> Vec<String> {
        lock(&self.state).confirmed.iter().cloned().collect()
    }
}

impl Drop for ChannelSubscriptions {
    fn drop(&mut self) {
        self.rejoin_task.abort();
        self.update_sub.unsubscribe();
    }
}
