use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod protocol;
#[cfg(test)]
mod tests;

pub use protocol::ServerMessage;

/// Handle returned to a subscriber. Dropping the receiver causes the sink
/// to be pruned on the next publish.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<ServerMessage>,
}

/// Fan-out hub for realtime observers.
///
/// Each sink is a bounded channel; `publish` uses `try_send` so one slow or
/// dead consumer can never stall the publisher or the other sinks. A sink
/// whose delivery fails is dropped as a side effect of that same publish.
/// Ordering is FIFO per sink only; nothing is guaranteed across sinks.
pub struct BroadcastHub {
    sinks: DashMap<u64, mpsc::Sender<ServerMessage>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl BroadcastHub {
    /// Create a hub whose sinks buffer up to `capacity` undelivered messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            sinks: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Register a new sink and deliver the one-shot initial snapshot as its
    /// first message.
    pub fn subscribe(&self, initial: ServerMessage) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        // Capacity >= 1 and the channel has no other producer yet, so the
        // initial snapshot cannot be rejected here.
        let _ = tx.try_send(initial);

        self.sinks.insert(id, tx);
        info!(sink_id = id, subscribers = self.sinks.len(), "Sink subscribed");

        Subscription { id, rx }
    }

    /// Remove a sink. Safe to call for an id that is already gone.
    pub fn unsubscribe(&self, id: u64) {
        if self.sinks.remove(&id).is_some() {
            info!(sink_id = id, subscribers = self.sinks.len(), "Sink unsubscribed");
        }
    }

    /// Deliver a message to every live sink, pruning the ones that fail.
    /// Returns the number of sinks the message was handed to.
    pub fn publish(&self, message: ServerMessage) -> usize {
        let mut delivered = 0;
        let mut failed: Vec<u64> = Vec::new();

        for entry in self.sinks.iter() {
            match entry.value().try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(sink_id = *entry.key(), "Sink backlogged, dropping it");
                    failed.push(*entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(sink_id = *entry.key(), "Sink closed, dropping it");
                    failed.push(*entry.key());
                }
            }
        }

        // Removal happens outside the iteration to keep shard locks short.
        for id in failed {
            self.sinks.remove(&id);
        }

        delivered
    }

    /// Number of currently subscribed sinks.
    pub fn subscriber_count(&self) -> usize {
        self.sinks.len()
    }
}
