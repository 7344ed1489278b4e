//! The broadcast primitive: a registry fanning each pushed value out to
//! every live subscriber.
//!
//! Purpose-built for the connection's message and event fan-out rather than
//! a general bus: subscribers get an unbounded channel, so delivery under
//! the registry lock never blocks, and the registry can be edited atomically
//! with respect to publishes.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::util::lock;

/// Registration handle for one subscriber. Used for removal; the receiving
/// stream itself carries no registry identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SubscriberId(u64);

struct Registry<T> {
    next_id: u64,
    closed: bool,
    subscribers: Vec<(SubscriberId, mpsc::UnboundedSender<T>)>,
}

/// A thread-safe fan-out registry.
///
/// All operations take the same mutex, so a publish can never observe a
/// half-edited subscriber set. No operation blocks or panics.
pub(crate) struct Hub<T> {
    registry: Mutex<Registry<T>>,
}

impl<T: Clone> Hub<T> {
    pub(crate) fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                closed: false,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Register a subscriber, returning its removal handle and the delivery
    /// channel. After `close()` the returned channel is already terminated.
    pub(crate) fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut reg = lock(&self.registry);
        let id = SubscriberId(reg.next_id);
        reg.next_id += 1;
        if !reg.closed {
            reg.subscribers.push((id, tx));
        }
        (id, rx)
    }

    /// Remove a subscriber. Unknown ids are a no-op.
    pub(crate) fn unsubscribe(&self, id: SubscriberId) {
        let mut reg = lock(&self.registry);
        reg.subscribers.retain(|(sub_id, _)| *sub_id != id);
    }

    /// Deliver `value` to every current subscriber in registration order.
    /// Subscribers whose receiver is gone are dropped from the registry.
    pub(crate) fn publish(&self, value: T) {
        let mut reg = lock(&self.registry);
        reg.subscribers
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());
    }

    /// Apply a structural transform to the subscriber set under the same
    /// lock publishes take.
    pub(crate) fn edit<F>(&self, transform: F)
    where
        F: FnOnce(&mut Vec<(SubscriberId, mpsc::UnboundedSender<T>)>),
    {
        let mut reg = lock(&self.registry);
        transform(&mut reg.subscribers);
    }

    /// Tear the registry down: drop every delivery channel so all
    /// subscriber streams terminate, and reject future registrations.
    /// Values already delivered remain readable by their receivers.
    pub(crate) fn close(&self) {
        let mut reg = lock(&self.registry);
        reg.closed = true;
        reg.subscribers.clear();
    }

    /// Number of live subscribers.
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}
