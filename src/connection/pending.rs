//! Pending receive records: one slot per in-flight `receive()` caller.
//!
//! Each slot is a one-shot continuation identified by a generated id, so
//! concurrent callers never collide and a cancelled caller removes exactly
//! its own slot. Resolution is exactly-once by construction: a slot leaves
//! the queue before its sender is used, and the queue rejects registration
//! after teardown so no caller can park where nothing will wake it.
//!
//! Messages that arrive while no caller is waiting are held in a bounded
//! backlog so a `receive()` issued just after the message landed still sees
//! it (the driver reads continuously; without the backlog, the wire-to-call
//! race would drop messages that a per-call transport receive would have
//! buffered). Subscriptions have their own channels and never touch this.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{Error, Result, TransportError};
use crate::message::Message;
use crate::util::lock;

/// Upper bound on messages held for direct receivers with nobody waiting.
const BACKLOG_LIMIT: usize = 256;

struct QueueInner {
    next_id: u64,
    closed: bool,
    slots: VecDeque<(u64, oneshot::Sender<Result<Message>>)>,
    backlog: VecDeque<Message>,
}

/// What `claim_or_register` got for the caller.
pub(crate) enum Claim {
    /// A backlogged message was immediately available.
    Ready(Message),
    /// The caller parked a new pending record; await the receiver.
    Waiting(u64, oneshot::Receiver<Result<Message>>),
}

/// FIFO registry of waiting `receive()` callers plus the backlog.
pub(crate) struct ReceiveQueue {
    inner: Mutex<QueueInner>,
}

impl ReceiveQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                next_id: 0,
                closed: false,
                slots: VecDeque::new(),
                backlog: VecDeque::new(),
            }),
        }
    }

    /// Take the oldest backlogged message, or register a pending record.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Cancelled`] if the queue has already been
    /// torn down.
    pub(crate) fn claim_or_register(&self) -> Result<Claim> {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return Err(TransportError::Cancelled.into());
        }
        if let Some(message) = inner.backlog.pop_front() {
            return Ok(Claim::Ready(message));
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = oneshot::channel();
        inner.slots.push_back((id, tx));
        Ok(Claim::Waiting(id, rx))
    }

    /// Remove a slot whose caller gave up (future dropped). No-op if the
    /// slot was already resolved.
    pub(crate) fn cancel(&self, id: u64) {
        let mut inner = lock(&self.inner);
        inner.slots.retain(|(slot_id, _)| *slot_id != id);
    }

    /// Deliver `message` to the oldest waiting record, or stash it in the
    /// backlog for the next direct caller. Slots whose receiver vanished
    /// mid-race are skipped. Returns `true` if a caller took it now.
    pub(crate) fn deliver(&self, message: Message) -> bool {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return false;
        }
        let mut message = message;
        while let Some((_, tx)) = inner.slots.pop_front() {
            match tx.send(Ok(message)) {
                Ok(()) => return true,
                Err(Ok(returned)) => message = returned,
                Err(Err(_)) => return false,
            }
        }
        if inner.backlog.len() < BACKLOG_LIMIT {
            inner.backlog.push_back(message);
        } else {
            trace!("receive backlog full, message visible to subscriptions only");
        }
        false
    }

    /// Fail every outstanding record with a clone of `error`, drop the
    /// backlog, and refuse all future registrations. Idempotent.
    pub(crate) fn fail_all(&self, error: &Error) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        inner.backlog.clear();
        while let Some((_, tx)) = inner.slots.pop_front() {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// Number of callers currently waiting.
    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        lock(&self.inner).slots.len()
    }
}

/// Removes a pending record if its caller is dropped before resolution.
pub(crate) struct SlotGuard<'a> {
    queue: &'a ReceiveQueue,
    id: u64,
    armed: bool,
}

impl<'a> SlotGuard<'a> {
    pub(crate) fn new(queue: &'a ReceiveQueue, id: u64) -> Self {
        Self {
            queue,
            id,
            armed: true,
        }
    }

    /// The slot resolved normally; nothing to clean up.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.cancel(self.id);
        }
    }
}
