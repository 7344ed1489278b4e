//! Live subscriptions to inbound messages and lifecycle events.
//!
//! Each subscription is a cancellable async stream fed by the connection's
//! broadcast hub. Streams hold only a weak back-reference to the hub, so a
//! live stream never extends the connection's lifetime; they terminate when
//! the connection closes and deregister themselves when dropped.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::trace;

use crate::hub::{Hub, SubscriberId};
use crate::message::{Message, SocketEvent};

/// A stream of every inbound application message.
///
/// Multiple `MessageStream`s on one connection each observe every message.
/// The stream ends when the connection disconnects.
pub struct MessageStream {
    rx: mpsc::UnboundedReceiver<Message>,
    hub: Weak<Hub<Message>>,
    id: SubscriberId,
}

impl MessageStream {
    pub(crate) fn new(hub: &Arc<Hub<Message>>) -> Self {
        let (id, rx) = hub.subscribe();
        Self {
            rx,
            hub: Arc::downgrade(hub),
            id,
        }
    }

    /// Receive the next message, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

/// A stream of inbound messages decoded as JSON into `T`.
///
/// Payloads that fail to decode are skipped, never surfaced; the stream
/// yields only successfully decoded values and ends when the connection
/// disconnects.
pub struct TypedStream<T> {
    rx: mpsc::UnboundedReceiver<Message>,
    hub: Weak<Hub<Message>>,
    id: SubscriberId,
    _decode: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedStream<T> {
    pub(crate) fn new(hub: &Arc<Hub<Message>>) -> Self {
        let (id, rx) = hub.subscribe();
        Self {
            rx,
            hub: Arc::downgrade(hub),
            id,
            _decode: PhantomData,
        }
    }

    /// Receive the next decodable value, or `None` once the connection is
    /// gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let msg = self.rx.recv().await?;
            match msg.decode() {
                Ok(value) => return Some(value),
                Err(e) => trace!(error = %e, "skipping undecodable message"),
            }
        }
    }
}

impl<T: DeserializeOwned> Stream for TypedStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        loop {
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(msg)) => match msg.decode() {
                    Ok(value) => return Poll::Ready(Some(value)),
                    Err(e) => trace!(error = %e, "skipping undecodable message"),
                },
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> Drop for TypedStream<T> {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

/// A stream of connection lifecycle events.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SocketEvent>,
    hub: Weak<Hub<SocketEvent>>,
    id: SubscriberId,
}

impl EventStream {
    pub(crate) fn new(hub: &Arc<Hub<SocketEvent>>) -> Self {
        let (id, rx) = hub.subscribe();
        Self {
            rx,
            hub: Arc::downgrade(hub),
            id,
        }
    }

    /// Receive the next event, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = SocketEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<SocketEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}
