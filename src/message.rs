//! Application-visible message, event, and close-code types.

use serde::de::DeserializeOwned;

use crate::connection::ConnectionState;
use crate::error::{ProtocolError, Result};

/// WebSocket close status code per RFC 6455 Section 7.4.
///
/// A connection starts at [`CloseCode::NoStatusReceived`] and keeps the code
/// of the most recent close handshake observed during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal,
    /// Going away (1001). Sent on heartbeat loss and internal teardown.
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// No status received (1005). Never sent on the wire; the value of
    /// `close_code()` before any close handshake happens.
    #[default]
    NoStatusReceived,
    /// Abnormal closure (1006). Never sent on the wire.
    Abnormal,
    /// Invalid payload (1007).
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Mandatory extension (1010).
    MandatoryExtension,
    /// Internal error (1011).
    InternalError,
    /// Any other code (registered 1012-1014, library/application 3000-4999).
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::NoStatusReceived,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Get the numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::NoStatusReceived => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Whether this code is reserved and must not be sent in a close frame
    /// (RFC 6455 Section 7.4.1: 1004-1006, 1015).
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

/// A complete inbound or outbound application message.
///
/// Control frames (ping, pong, close) are handled inside the connection and
/// never surface through this type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    /// A text message (UTF-8 encoded).
    Text(String),
    /// A binary message (arbitrary bytes).
    Binary(Vec<u8>),
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Returns `true` if this is a text message.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Returns `true` if this is a binary message.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Borrow the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    /// Borrow the binary content, if this is a binary message.
    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Message::Binary(data) => Some(data),
            Message::Text(_) => None,
        }
    }

    /// Consume and return the text content, if this is a text message.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    /// Consume and return the binary content, if this is a binary message.
    #[must_use]
    pub fn into_binary(self) -> Option<Vec<u8>> {
        match self {
            Message::Binary(data) => Some(data),
            Message::Text(_) => None,
        }
    }

    /// Decode the payload as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] if the payload is not valid JSON
    /// for `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let result = match self {
            Message::Text(s) => serde_json::from_str(s),
            Message::Binary(data) => serde_json::from_slice(data),
        };
        result.map_err(|e| ProtocolError::Decode(e.to_string()).into())
    }
}

/// Connection lifecycle events, emitted on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SocketEvent {
    /// The connection moved to a new state.
    StateChanged(ConnectionState),
    /// The transport reports a better network path is available.
    PathShouldRefresh,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_message_text_creation() {
        let msg = Message::text("hello");
        assert!(matches!(msg, Message::Text(s) if s == "hello"));
        assert!(Message::text("x").is_text());
        assert!(!Message::text("x").is_binary());
    }

    #[test]
    fn test_message_binary_creation() {
        let msg = Message::binary(vec![1, 2, 3]);
        assert!(matches!(msg, Message::Binary(ref d) if d == &[1, 2, 3]));
        assert!(Message::binary([1]).is_binary());
    }

    #[test]
    fn test_message_accessors() {
        assert_eq!(Message::text("hi").as_text(), Some("hi"));
        assert_eq!(Message::text("hi").as_binary(), None);
        assert_eq!(Message::binary([1, 2]).as_binary(), Some([1, 2].as_slice()));
        assert_eq!(Message::text("hi").into_text(), Some("hi".to_string()));
        assert_eq!(Message::binary([9]).into_binary(), Some(vec![9]));
        assert_eq!(Message::binary([9]).into_text(), None);
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Ticker {
        symbol: String,
        price: f64,
    }

    #[test]
    fn test_decode_text_json() {
        let msg = Message::text(r#"{"symbol":"BTC","price":42.5}"#);
        let ticker: Ticker = msg.decode().unwrap();
        assert_eq!(ticker.symbol, "BTC");
    }

    #[test]
    fn test_decode_binary_json() {
        let msg = Message::binary(br#"{"symbol":"ETH","price":3.25}"#.to_vec());
        let ticker: Ticker = msg.decode().unwrap();
        assert_eq!(ticker.symbol, "ETH");
    }

    #[test]
    fn test_decode_failure() {
        let msg = Message::text("not json");
        let result: Result<Ticker> = msg.decode();
        assert!(matches!(
            result,
            Err(crate::Error::Protocol(ProtocolError::Decode(_)))
        ));
    }

    #[test]
    fn test_close_code_roundtrip() {
        for code in [1000u16, 1001, 1002, 1003, 1005, 1006, 1007, 1008, 1009, 1010, 1011, 3000] {
            assert_eq!(CloseCode::from_u16(code).as_u16(), code);
        }
    }

    #[test]
    fn test_close_code_default_is_no_status() {
        assert_eq!(CloseCode::default(), CloseCode::NoStatusReceived);
        assert_eq!(CloseCode::default().as_u16(), 1005);
    }

    #[test]
    fn test_close_code_reserved() {
        assert!(CloseCode::NoStatusReceived.is_reserved());
        assert!(CloseCode::Abnormal.is_reserved());
        assert!(CloseCode::Other(1004).is_reserved());
        assert!(CloseCode::Other(1015).is_reserved());
        assert!(!CloseCode::Normal.is_reserved());
        assert!(!CloseCode::GoingAway.is_reserved());
        assert!(!CloseCode::Other(3000).is_reserved());
    }

    #[test]
    fn test_socket_event_equality() {
        assert_eq!(
            SocketEvent::StateChanged(ConnectionState::Connected),
            SocketEvent::StateChanged(ConnectionState::Connected)
        );
        assert_ne!(
            SocketEvent::StateChanged(ConnectionState::Disconnected),
            SocketEvent::PathShouldRefresh
        );
    }
}
