//! Error types for the WebSocket client.
//!
//! The taxonomy separates "the network failed" ([`TransportError`]) from
//! "the API was misused or the peer violated the protocol"
//! ([`ProtocolError`]), with a generic system bucket for everything else.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket client operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The underlying network transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An unclassified system-level failure.
    #[error("system error: {0}")]
    System(String),

    /// API misuse or a protocol-level violation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Classified transport-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The connection was aborted or reset by the peer or the OS.
    #[error("connection aborted")]
    Aborted,

    /// The operation was cancelled because the connection was torn down.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation did not complete in time.
    #[error("operation timed out")]
    TimedOut,

    /// The local network is unreachable.
    #[error("network is down")]
    NetworkDown,

    /// The transport is not connected (includes EOF on read).
    #[error("transport not connected")]
    NotConnected,

    /// TLS setup or record-layer failure.
    #[error("tls failure: {0}")]
    Tls(String),

    /// Any other I/O failure.
    #[error("i/o failure: {0}")]
    Io(String),
}

/// Protocol and API-misuse errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// `connect()` was called while a connect was outstanding or after one
    /// already completed. Connections are single-use.
    #[error("invalid connection access: connect already in progress or completed")]
    InvalidConnectionAccess,

    /// The operation requires a connected socket.
    #[error("socket is not connected")]
    SocketNotConnected,

    /// The connection exists but is not ready to service the request.
    #[error("connection is not ready")]
    ConnectionNotReady,

    /// Failed to encode an outbound payload.
    #[error("encode failure: {0}")]
    Encode(String),

    /// Failed to decode an inbound payload into the requested type.
    #[error("decode failure: {0}")]
    Decode(String),

    /// Establishing the connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The graceful close handshake failed.
    #[error("disconnect failed: {0}")]
    DisconnectFailed(String),

    /// Inbound bytes did not form a recognizable frame.
    #[error("bad data format: {0}")]
    BadDataFormat(String),

    /// The configured heartbeat interval is below the supported minimum.
    #[error("heartbeat interval must be at least 1s, got {0:?}")]
    InvalidHeartbeatInterval(Duration),

    /// More bytes are needed to finish parsing a frame. Internal fail-soft
    /// marker consumed by the codec read loop; never surfaced to callers.
    #[error("incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Control frame payload exceeds the RFC 6455 limit of 125 bytes.
    #[error("control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Control frames cannot be fragmented.
    #[error("control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// A single frame exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A reassembled message exceeds the configured maximum.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// The HTTP upgrade handshake was malformed or rejected.
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),

    /// A text message carried invalid UTF-8.
    #[error("invalid utf-8 in text message")]
    InvalidUtf8,
}

impl TransportError {
    /// Classify an I/O error into a transport error class.
    pub fn classify(err: &io::Error) -> Self {
        use io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                TransportError::Aborted
            }
            ErrorKind::TimedOut => TransportError::TimedOut,
            ErrorKind::NotConnected => TransportError::NotConnected,
            ErrorKind::NetworkDown | ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable => {
                TransportError::NetworkDown
            }
            _ => TransportError::Io(err.to_string()),
        }
    }
}

impl Error {
    /// Whether this error indicates the connection is beyond recovery and an
    /// internal close should be forced. Best-effort heuristic: unrecognized
    /// errors are surfaced to the caller without forcing teardown.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport(
                TransportError::Aborted
                    | TransportError::NotConnected
                    | TransportError::NetworkDown
            )
        )
    }

    /// Whether this is the internal incomplete-frame marker.
    pub(crate) fn is_incomplete(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::IncompleteFrame { .. }))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Transport(TransportError::classify(&err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(ProtocolError::Decode(err.to_string()))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::Protocol(ProtocolError::InvalidUtf8)
    }
}
