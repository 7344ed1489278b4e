//! Ping/pong liveness detection.
//!
//! An independent timer loop pings the peer every interval. If a tick fires
//! while the previous ping is still unanswered, the heartbeat is declared
//! missed and the delegate is told to close the connection: one miss is
//! fatal, with no retry budget and no grace window. A pong that loses the
//! race with its tick therefore counts as a miss; that trade-off keeps the
//! status machine to three states.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::util::lock;

/// Liveness status of the current interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BeatStatus {
    /// No ping outstanding (initial state).
    Idle,
    /// A ping was sent; the pong has not arrived yet.
    WaitingForPong,
    /// The pong for the last ping arrived.
    Received,
}

/// Actions the heartbeat asks of its owning connection.
///
/// Implementations must not block; slow work is spawned by the implementor.
/// The heartbeat holds only a weak reference to its delegate, so a dropped
/// connection silently ends the loop.
pub(crate) trait HeartbeatDelegate: Send + Sync + 'static {
    /// Send a ping to the peer.
    fn send_ping(&self);

    /// The peer missed a heartbeat; close the connection.
    fn heartbeat_missed(&self);
}

/// Periodic ping loop with one-miss-is-fatal semantics.
pub(crate) struct Heartbeat {
    status: Mutex<BeatStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
    self_ref: Weak<Heartbeat>,
}

impl Heartbeat {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            status: Mutex::new(BeatStatus::Idle),
            task: Mutex::new(None),
            self_ref: weak.clone(),
        })
    }

    /// Start the loop, cancelling any previous run.
    pub(crate) fn start(&self, interval: Duration, delegate: Weak<dyn HeartbeatDelegate>) {
        self.stop();
        *lock(&self.status) = BeatStatus::Idle;

        let handle = tokio::spawn(run(self.self_ref.clone(), interval, delegate));
        *lock(&self.task) = Some(handle);
    }

    /// Record a pong from the receive path. Callable from any task.
    pub(crate) fn received_heartbeat(&self) {
        *lock(&self.status) = BeatStatus::Received;
    }

    /// Stop the loop. Idempotent; safe to call during teardown.
    pub(crate) fn stop(&self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    heartbeat: Weak<Heartbeat>,
    interval: Duration,
    delegate: Weak<dyn HeartbeatDelegate>,
) {
    loop {
        tokio::time::sleep(interval).await;

        let Some(heartbeat) = heartbeat.upgrade() else {
            return;
        };
        let missed = {
            let mut status = lock(&heartbeat.status);
            match *status {
                BeatStatus::WaitingForPong => true,
                BeatStatus::Idle | BeatStatus::Received => {
                    *status = BeatStatus::WaitingForPong;
                    false
                }
            }
        };

        let Some(delegate) = delegate.upgrade() else {
            return;
        };
        if missed {
            warn!("heartbeat missed, closing connection");
            delegate.heartbeat_missed();
            return;
        }
        debug!("heartbeat ping");
        delegate.send_ping();
    }
}
