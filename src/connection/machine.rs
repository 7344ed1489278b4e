//! The connection state machine.
//!
//! One `Shared` per logical socket. A single driver task pumps the read
//! half: frames are reassembled into messages, dispatched by opcode, and
//! every data message resolves the oldest waiting `receive()` record and is
//! republished to all live subscriptions. Writers go through an async mutex
//! so concurrent senders serialize at the frame boundary.
//!
//! Every lifecycle gate here (connect phase, close-once, teardown-once) is
//! an explicit state slot checked under a lock, never call-site discipline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use serde::de::DeserializeOwned;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::codec::{FrameReader, FrameWriter, Role};
use crate::config::Config;
use crate::connection::connector::{self, AsyncStream, Endpoint};
use crate::connection::pending::{Claim, ReceiveQueue, SlotGuard};
use crate::connection::state::ConnectionState;
use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::heartbeat::{Heartbeat, HeartbeatDelegate};
use crate::hub::Hub;
use crate::message::{CloseCode, Message, SocketEvent};
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::{Frame, OpCode};
use crate::subscription::{EventStream, MessageStream, TypedStream};
use crate::util::lock;

type SocketWriter = Arc<AsyncMutex<FrameWriter<WriteHalf<Box<dyn AsyncStream>>>>>;

/// Progress of the one permitted `connect()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectPhase {
    Idle,
    InFlight,
    Done,
}

/// State shared between the public facade, the driver task, the heartbeat,
/// and every caller task.
pub(crate) struct Shared {
    config: Config,
    endpoint: Endpoint,
    self_ref: Weak<Shared>,
    state: StdMutex<ConnectionState>,
    close_code: StdMutex<CloseCode>,
    phase: StdMutex<ConnectPhase>,
    writer: StdMutex<Option<SocketWriter>>,
    pending: ReceiveQueue,
    close_waiters: StdMutex<Vec<oneshot::Sender<()>>>,
    messages: Arc<Hub<Message>>,
    events: Arc<Hub<SocketEvent>>,
    heartbeat: Arc<Heartbeat>,
    driver: StdMutex<Option<JoinHandle<()>>>,
    close_started: AtomicBool,
    torn_down: AtomicBool,
}

impl Shared {
    pub(crate) fn new(endpoint: Endpoint, config: Config) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            endpoint,
            self_ref: weak.clone(),
            state: StdMutex::new(ConnectionState::Connecting),
            close_code: StdMutex::new(CloseCode::NoStatusReceived),
            phase: StdMutex::new(ConnectPhase::Idle),
            writer: StdMutex::new(None),
            pending: ReceiveQueue::new(),
            close_waiters: StdMutex::new(Vec::new()),
            messages: Arc::new(Hub::new()),
            events: Arc::new(Hub::new()),
            heartbeat: Heartbeat::new(),
            driver: StdMutex::new(None),
            close_started: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Snapshot of the current lifecycle state.
    pub(crate) fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// The close code of the most recent close handshake, or
    /// `NoStatusReceived` if none happened yet.
    pub(crate) fn close_code(&self) -> CloseCode {
        *lock(&self.close_code)
    }

    fn transition(&self, next: ConnectionState) {
        let mut state = lock(&self.state);
        if *state == next {
            return;
        }
        debug!(from = %*state, to = %next, "connection state change");
        *state = next;
        drop(state);
        self.events.publish(SocketEvent::StateChanged(next));
    }

    /// Establish the connection. Valid exactly once per instance; callers
    /// racing the winner fail with `InvalidConnectionAccess`.
    pub(crate) async fn connect(&self) -> Result<()> {
        self.config.validate_heartbeat()?;

        {
            let mut phase = lock(&self.phase);
            if *phase != ConnectPhase::Idle {
                return Err(ProtocolError::InvalidConnectionAccess.into());
            }
            *phase = ConnectPhase::InFlight;
        }

        let dialed = connector::dial(&self.endpoint, &self.config).await;
        *lock(&self.phase) = ConnectPhase::Done;

        let (stream, leftover) = match dialed {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, endpoint = %self.endpoint, "connect failed");
                self.teardown(false);
                return Err(ProtocolError::ConnectFailed(e.to_string()).into());
            }
        };

        if self.torn_down.load(Ordering::SeqCst) {
            // Torn down while dialing (drop or force close mid-connect).
            return Err(TransportError::Cancelled.into());
        }

        let Some(me) = self.self_ref.upgrade() else {
            return Err(TransportError::Cancelled.into());
        };

        let (read_half, write_half) = tokio::io::split(stream);
        let writer = Arc::new(AsyncMutex::new(FrameWriter::new(write_half, Role::Client)));
        *lock(&self.writer) = Some(writer);
        let reader = FrameReader::with_buffer(read_half, self.config.limits.clone(), leftover);

        self.transition(ConnectionState::Connected);
        *lock(&self.driver) = Some(tokio::spawn(drive(Arc::clone(&me), reader)));

        if let Some(interval) = self.config.heartbeat_interval {
            let me_dyn: Arc<dyn HeartbeatDelegate> = me.clone();
            let delegate: Weak<dyn HeartbeatDelegate> = Arc::downgrade(&me_dyn);
            self.heartbeat.start(interval, delegate);
        }

        debug!(endpoint = %self.endpoint, "connected");
        Ok(())
    }

    /// Send an application message.
    pub(crate) async fn send(&self, message: Message) -> Result<()> {
        let frame = match message {
            Message::Text(text) => Frame::text(text),
            Message::Binary(data) => Frame::binary(data),
        };
        self.send_frame(frame).await
    }

    /// Send a ping control frame.
    pub(crate) async fn ping(&self) -> Result<()> {
        self.send_frame(Frame::ping(Vec::new())).await
    }

    /// Send an unsolicited pong control frame.
    pub(crate) async fn pong(&self) -> Result<()> {
        self.send_frame(Frame::pong(Vec::new())).await
    }

    async fn send_frame(&self, frame: Frame) -> Result<()> {
        if !self.state().can_transfer() {
            return Err(ProtocolError::SocketNotConnected.into());
        }
        match self.write_frame(&frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_fatal() {
                    warn!(error = %e, "fatal transport error on send, closing");
                    self.spawn_internal_close(CloseCode::GoingAway);
                }
                Err(e)
            }
        }
    }

    /// Write a frame without the connected-state check. Used by the close
    /// path and the driver's auto-pong, where state may already be closing.
    async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let writer = lock(&self.writer)
            .clone()
            .ok_or(ProtocolError::SocketNotConnected)?;
        let mut writer = writer.lock().await;
        writer.write_frame(frame).await
    }

    /// Suspend until the next inbound application message is delivered to
    /// this caller specifically (or immediately take one that arrived while
    /// nobody was waiting).
    pub(crate) async fn receive(&self) -> Result<Message> {
        if !self.state().can_transfer() {
            return Err(ProtocolError::SocketNotConnected.into());
        }
        match self.pending.claim_or_register()? {
            Claim::Ready(message) => Ok(message),
            Claim::Waiting(id, rx) => {
                let guard = SlotGuard::new(&self.pending, id);
                let outcome = rx.await;
                guard.disarm();
                match outcome {
                    Ok(result) => result,
                    // Sender vanished without resolving; treat as teardown.
                    Err(_) => Err(TransportError::Cancelled.into()),
                }
            }
        }
    }

    /// Receive and JSON-decode into `T`, silently re-arming the receive on
    /// decode failure. Callers only ever see a value or a connection error.
    pub(crate) async fn receive_as<T: DeserializeOwned>(&self) -> Result<T> {
        loop {
            let message = self.receive().await?;
            match message.decode() {
                Ok(value) => return Ok(value),
                Err(e) => trace!(error = %e, "decode failed, re-arming receive"),
            }
        }
    }

    pub(crate) fn messages(&self) -> MessageStream {
        MessageStream::new(&self.messages)
    }

    pub(crate) fn messages_as<T: DeserializeOwned>(&self) -> TypedStream<T> {
        TypedStream::new(&self.messages)
    }

    pub(crate) fn events(&self) -> EventStream {
        EventStream::new(&self.events)
    }

    /// Fire-and-forget close: initiate the handshake and tear down local
    /// state without waiting for the peer's acknowledgment.
    pub(crate) fn close(&self, code: CloseCode) {
        if self.state().is_disconnected() {
            return;
        }
        if let Some(me) = self.self_ref.upgrade() {
            tokio::spawn(async move {
                let _ = me.close_graceful(code).await;
            });
        }
    }

    /// Close and wait for the connection to reach its terminal state.
    pub(crate) async fn close_async(&self, code: CloseCode) -> Result<()> {
        if self.state().is_disconnected() {
            return Ok(());
        }

        let rx = {
            let mut waiters = lock(&self.close_waiters);
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            rx
        };
        if self.torn_down.load(Ordering::SeqCst) {
            // Teardown raced the registration; drain so nothing dangles.
            for tx in lock(&self.close_waiters).drain(..) {
                let _ = tx.send(());
            }
            return Ok(());
        }

        let result = self.close_graceful(code).await;
        let _ = rx.await;
        result
    }

    /// Send the close frame (at most once across all close paths) and tear
    /// down. Later callers observe the no-op path.
    pub(crate) async fn close_graceful(&self, code: CloseCode) -> Result<()> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.close_started.swap(true, Ordering::SeqCst) {
            // A close frame is already on its way (ours or the reply to the
            // peer's). Make sure local teardown happens regardless, e.g.
            // when a peer close was configured not to disconnect.
            self.teardown(true);
            return Ok(());
        }

        debug!(code = code.as_u16(), "closing connection");
        *lock(&self.close_code) = code;

        // Reserved codes (1005/1006/1015) must not appear on the wire.
        let wire_code = (!code.is_reserved()).then(|| code.as_u16());
        let frame = Frame::close(wire_code, "");
        let writer_slot = lock(&self.writer).clone();
        let sent = match writer_slot {
            Some(writer) => {
                let mut writer = writer.lock().await;
                writer.write_frame(&frame).await
            }
            None => Ok(()), // never connected, nothing to send
        };

        self.teardown(true);

        sent.map_err(|e| ProtocolError::DisconnectFailed(e.to_string()).into())
    }

    /// Abandon the handshake entirely and cancel the transport now.
    pub(crate) fn force_close(&self) {
        debug!("force close");
        self.teardown(true);
    }

    /// Resolve every pending record with a cancellation error, terminate
    /// every subscription, stop the heartbeat, and release the transport.
    /// Exactly once; later calls are no-ops.
    pub(crate) fn teardown(&self, abort_driver: bool) {
        self.teardown_with(abort_driver, Error::Transport(TransportError::Cancelled));
    }

    /// Teardown resolving pending records with a specific error, so callers
    /// blocked in `receive()` see what actually went wrong.
    fn teardown_with(&self, abort_driver: bool, error: Error) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("tearing down connection");

        self.heartbeat.stop();
        self.transition(ConnectionState::Disconnected);
        self.events.close();
        self.messages.close();
        self.pending.fail_all(&error);
        for tx in lock(&self.close_waiters).drain(..) {
            let _ = tx.send(());
        }
        *lock(&self.writer) = None;

        let handle = lock(&self.driver).take();
        if abort_driver && let Some(handle) = handle {
            handle.abort();
        }
    }

    fn spawn_internal_close(&self, code: CloseCode) {
        if let Some(me) = self.self_ref.upgrade() {
            tokio::spawn(async move {
                if me.close_graceful(code).await.is_err() {
                    me.force_close();
                }
            });
        }
    }
}

impl HeartbeatDelegate for Shared {
    fn send_ping(&self) {
        if let Some(me) = self.self_ref.upgrade() {
            tokio::spawn(async move {
                if let Err(e) = me.send_frame(Frame::ping(Vec::new())).await {
                    warn!(error = %e, "heartbeat ping failed");
                }
            });
        }
    }

    fn heartbeat_missed(&self) {
        if let Some(me) = self.self_ref.upgrade() {
            tokio::spawn(async move {
                if me.close_graceful(CloseCode::GoingAway).await.is_err() {
                    me.force_close();
                }
            });
        }
    }
}

/// The read pump: one per connection, ends at teardown.
async fn drive(shared: Arc<Shared>, mut reader: FrameReader<ReadHalf<Box<dyn AsyncStream>>>) {
    let mut assembler = MessageAssembler::new(shared.config.limits.clone());

    loop {
        let frame = match reader.read_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                if !shared.torn_down.load(Ordering::SeqCst) {
                    warn!(error = %e, "socket read failed");
                }
                shared.teardown_with(false, e);
                return;
            }
        };
        trace!(opcode = %frame.opcode, len = frame.payload().len(), "frame received");

        match frame.opcode {
            OpCode::Ping => {
                let pong = Frame::pong(frame.into_payload());
                if let Err(e) = shared.write_frame(&pong).await {
                    warn!(error = %e, "auto-pong failed");
                }
            }
            OpCode::Pong => {
                shared.heartbeat.received_heartbeat();
            }
            OpCode::Close => {
                let code = frame
                    .close_status()
                    .map(CloseCode::from_u16)
                    .unwrap_or(CloseCode::NoStatusReceived);
                debug!(code = code.as_u16(), "close frame from peer");
                *lock(&shared.close_code) = code;

                if !shared.close_started.swap(true, Ordering::SeqCst) {
                    // Echo the peer's code per RFC 6455 Section 5.5.1.
                    let reply_code = (!code.is_reserved()).then(|| code.as_u16());
                    let _ = shared.write_frame(&Frame::close(reply_code, "")).await;
                }
                if shared.config.disconnect_on_close {
                    shared.teardown(false);
                    return;
                }
                // Configured to outlive a peer close: keep listening.
            }
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                match assembler.push(frame) {
                    Ok(Some(message)) => {
                        // Oldest direct caller first, then every live
                        // subscription sees the same message.
                        shared.pending.deliver(message.clone());
                        shared.messages.publish(message);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "protocol violation from peer");
                        if !shared.close_started.swap(true, Ordering::SeqCst) {
                            *lock(&shared.close_code) = CloseCode::ProtocolError;
                            let close =
                                Frame::close(Some(CloseCode::ProtocolError.as_u16()), "");
                            let _ = shared.write_frame(&close).await;
                        }
                        shared.teardown_with(false, e);
                        return;
                    }
                }
            }
        }
    }
}
