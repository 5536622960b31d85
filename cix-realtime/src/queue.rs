//! Outbound queue for envelopes sent while the link is down.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::envelope::Envelope;

/// FIFO buffer of envelopes awaiting transmission.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<Envelope>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail.
    pub fn push(&mut self, envelope: Envelope) {
        self.items.push_back(envelope);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transmit queued envelopes head to tail, one at a time.
    ///
    /// Stops at the first envelope `transmit` rejects; that envelope and
    /// everything behind it stay queued in their original order. Returns the
    /// number transmitted.
    pub fn drain_with<F>(&mut self, mut transmit: F) -> usize
    where
        F: FnMut(&Envelope) -> bool,
    {
        let mut sent = 0;
        while let Some(envelope) = self.items.pop_front() {
            if transmit(&envelope) {
                sent += 1;
            } else {
                warn!(
                    "flush stopped at queued '{}' envelope, {} left queued",
                    envelope.kind(),
                    self.items.len() + 1
                );
                self.items.push_front(envelope);
                break;
            }
        }
        if sent > 0 {
            debug!("flushed {sent} queued envelope(s)");
        }
        sent
    }

    /// Kinds of the queued envelopes, head first.
    pub fn kinds(&self) -> Vec<String> {
        self.items.iter().map(|e| e.kind().to_string()).collect()
    }
}
