//! Public client facade. Thin delegation to the connection core.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::connection::{ConnectionState, Endpoint, Shared};
use crate::error::Result;
use crate::message::{CloseCode, Message};
use crate::subscription::{EventStream, MessageStream, TypedStream};

/// An asynchronous WebSocket client.
///
/// One `WebSocket` manages one logical connection: it is connected once,
/// used, and discarded. Dropping it resolves every in-flight operation with
/// a cancellation error and terminates every live subscription.
///
/// ```rust,ignore
/// use sockline::{Config, WebSocket};
///
/// let ws = WebSocket::new("ws://localhost:9001/feed", Config::new().with_insecure_connections(true))?;
/// ws.connect().await?;
/// ws.send_text("hello").await?;
/// let reply = ws.receive().await?;
/// ws.close_async(None).await?;
/// ```
pub struct WebSocket {
    shared: Arc<Shared>,
}

impl WebSocket {
    /// Create a client for `url` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::ProtocolError::ConnectFailed`] if the URL cannot be
    /// parsed as a WebSocket endpoint.
    pub fn new(url: &str, config: Config) -> Result<Self> {
        let endpoint = Endpoint::parse(url)?;
        Ok(Self {
            shared: Shared::new(endpoint, config),
        })
    }

    /// Establish the connection and start the heartbeat if configured.
    ///
    /// Valid exactly once per instance. Concurrent or repeated calls fail
    /// with [`crate::ProtocolError::InvalidConnectionAccess`].
    pub async fn connect(&self) -> Result<()> {
        self.shared.connect().await
    }

    /// Send an application message.
    pub async fn send(&self, message: Message) -> Result<()> {
        self.shared.send(message).await
    }

    /// Send a text message.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.shared.send(Message::text(text)).await
    }

    /// Send a binary message.
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.shared.send(Message::binary(data)).await
    }

    /// Receive the next inbound message.
    ///
    /// Each concurrent caller gets its own uniquely-identified pending
    /// record; messages resolve callers oldest-first, and every message is
    /// also delivered to all live [`MessageStream`]s. Messages that arrive
    /// while no caller is waiting are buffered (up to a small window) for
    /// the next direct caller. The returned future is detached from
    /// `self`'s lifetime: it resolves with a cancellation error if the
    /// client is dropped, and dropping the future releases only its own
    /// pending record.
    pub fn receive(&self) -> impl Future<Output = Result<Message>> + Send + use<> {
        let shared = Arc::clone(&self.shared);
        async move { shared.receive().await }
    }

    /// Receive the next inbound message that decodes (as JSON) into `T`.
    ///
    /// Decode failures silently re-arm the receive; this only resolves with
    /// a decoded value or a connection failure.
    pub async fn receive_as<T: DeserializeOwned>(&self) -> Result<T> {
        self.shared.receive_as().await
    }

    /// Subscribe to all inbound messages.
    pub fn messages(&self) -> MessageStream {
        self.shared.messages()
    }

    /// Subscribe to inbound messages decoded (as JSON) into `T`;
    /// undecodable messages are skipped.
    pub fn messages_as<T: DeserializeOwned>(&self) -> TypedStream<T> {
        self.shared.messages_as()
    }

    /// Subscribe to connection lifecycle events.
    pub fn events(&self) -> EventStream {
        self.shared.events()
    }

    /// Send a ping control frame.
    pub async fn ping(&self) -> Result<()> {
        self.shared.ping().await
    }

    /// Send an unsolicited pong control frame.
    pub async fn pong(&self) -> Result<()> {
        self.shared.pong().await
    }

    /// Close the connection without waiting for the peer's acknowledgment.
    ///
    /// `code` defaults to [`CloseCode::Normal`]. Safe to call repeatedly and
    /// on an already-disconnected client; at most one close handshake is
    /// ever initiated. Must be called from within a Tokio runtime (the
    /// handshake is spawned).
    pub fn close(&self, code: Option<CloseCode>) {
        self.shared.close(code.unwrap_or(CloseCode::Normal));
    }

    /// Close the connection and wait until it reaches its terminal state.
    ///
    /// `code` defaults to [`CloseCode::Normal`]. A no-op on an
    /// already-disconnected client.
    pub async fn close_async(&self, code: Option<CloseCode>) -> Result<()> {
        self.shared
            .close_async(code.unwrap_or(CloseCode::Normal))
            .await
    }

    /// Cancel the transport immediately, skipping the close handshake.
    pub fn force_close(&self) {
        self.shared.force_close();
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// The close code recorded by the most recent close handshake, or
    /// [`CloseCode::NoStatusReceived`] before any.
    pub fn close_code(&self) -> CloseCode {
        self.shared.close_code()
    }
}

impl Drop for WebSocket {
    fn drop(&mut self) {
        // Owner teardown is the single step that invalidates the whole
        // subgraph: pending records, subscriptions, heartbeat, driver.
        self.shared.teardown(true);
    }
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("state", &self.shared.state())
            .field("close_code", &self.shared.close_code())
            .finish()
    }
}
