//! HTTP upgrade handshake (RFC 6455 Section 4).
//!
//! The client side builds the upgrade request and verifies the server's
//! accept key; the server side (used by in-process test servers) parses a
//! request and produces the 101 response.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};

/// The GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on handshake header size, either direction.
pub const MAX_HANDSHAKE_SIZE: usize = 8192;

/// Compute the Sec-WebSocket-Accept value for a Sec-WebSocket-Key:
/// `base64(sha1(key + GUID))`.
///
/// ```
/// use sockline::protocol::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a random 16-byte Sec-WebSocket-Key, base64 encoded.
#[must_use]
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    if getrandom::getrandom(&mut nonce).is_err() {
        // Entropy failure: derive from the clock. The key only needs to be
        // unpredictable enough to defeat cache poisoning.
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        nonce[..16].copy_from_slice(&nanos.to_le_bytes());
    }
    BASE64.encode(nonce)
}

/// Find the end of the HTTP header block (`\r\n\r\n`), returning the offset
/// one past it.
#[must_use]
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn parse_header_block(text: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in text.lines().skip(1) {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// Client side of the upgrade handshake.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    key: String,
}

impl ClientHandshake {
    /// Create a handshake with a fresh random key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            key: generate_key(),
        }
    }

    /// The Sec-WebSocket-Key this handshake sends.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Build the upgrade request for `host` and `path`.
    #[must_use]
    pub fn request(&self, host: &str, path: &str) -> String {
        format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            key = self.key,
        )
    }

    /// Validate the server's response header block.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHandshake`] if the response is not a
    /// well-formed 101 upgrade or the accept key does not match.
    pub fn validate_response(&self, head: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(head)
            .map_err(|_| ProtocolError::InvalidHandshake("response is not valid UTF-8".into()))?;

        let status_line = text
            .lines()
            .next()
            .ok_or_else(|| ProtocolError::InvalidHandshake("empty response".into()))?;
        let mut parts = status_line.split_whitespace();
        let version = parts.next().unwrap_or("");
        let status = parts.next().unwrap_or("");
        if !version.starts_with("HTTP/1.1") || status != "101" {
            return Err(ProtocolError::InvalidHandshake(format!(
                "expected HTTP/1.1 101, got {status_line:?}"
            ))
            .into());
        }

        let headers = parse_header_block(text);

        match headers.get("upgrade") {
            Some(v) if v.eq_ignore_ascii_case("websocket") => {}
            other => {
                return Err(ProtocolError::InvalidHandshake(format!(
                    "bad Upgrade header: {other:?}"
                ))
                .into());
            }
        }
        match headers.get("connection") {
            Some(v) if v.to_lowercase().contains("upgrade") => {}
            other => {
                return Err(ProtocolError::InvalidHandshake(format!(
                    "bad Connection header: {other:?}"
                ))
                .into());
            }
        }

        let accept = headers.get("sec-websocket-accept").ok_or_else(|| {
            ProtocolError::InvalidHandshake("missing Sec-WebSocket-Accept header".into())
        })?;
        if *accept != compute_accept_key(&self.key) {
            return Err(
                ProtocolError::InvalidHandshake("Sec-WebSocket-Accept mismatch".into()).into(),
            );
        }

        Ok(())
    }
}

impl Default for ClientHandshake {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed client upgrade request (server side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request path.
    pub path: String,
    /// Host header value.
    pub host: String,
    /// Sec-WebSocket-Key header value.
    pub key: String,
    /// Sec-WebSocket-Version header value.
    pub version: u8,
}

impl HandshakeRequest {
    /// Parse an upgrade request from its raw header block.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHandshake`] if the request line or a
    /// required header is missing or malformed.
    pub fn parse(head: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(head)
            .map_err(|_| ProtocolError::InvalidHandshake("request is not valid UTF-8".into()))?;

        let request_line = text
            .lines()
            .next()
            .ok_or_else(|| ProtocolError::InvalidHandshake("empty request".into()))?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 || parts[0] != "GET" || !parts[2].starts_with("HTTP/1.1") {
            return Err(ProtocolError::InvalidHandshake(format!(
                "bad request line: {request_line:?}"
            ))
            .into());
        }
        let path = parts[1].to_string();

        let headers = parse_header_block(text);

        match headers.get("upgrade") {
            Some(v) if v.eq_ignore_ascii_case("websocket") => {}
            other => {
                return Err(ProtocolError::InvalidHandshake(format!(
                    "bad Upgrade header: {other:?}"
                ))
                .into());
            }
        }
        match headers.get("connection") {
            Some(v) if v.to_lowercase().contains("upgrade") => {}
            other => {
                return Err(ProtocolError::InvalidHandshake(format!(
                    "bad Connection header: {other:?}"
                ))
                .into());
            }
        }

        let host = headers
            .get("host")
            .ok_or_else(|| ProtocolError::InvalidHandshake("missing Host header".into()))?
            .clone();
        let key = headers
            .get("sec-websocket-key")
            .ok_or_else(|| {
                ProtocolError::InvalidHandshake("missing Sec-WebSocket-Key header".into())
            })?
            .clone();
        let version: u8 = headers
            .get("sec-websocket-version")
            .ok_or_else(|| {
                ProtocolError::InvalidHandshake("missing Sec-WebSocket-Version header".into())
            })?
            .parse()
            .map_err(|_| ProtocolError::InvalidHandshake("unparsable version".into()))?;
        if version != 13 {
            return Err(ProtocolError::InvalidHandshake(format!(
                "unsupported version {version} (expected 13)"
            ))
            .into());
        }

        Ok(Self {
            path,
            host,
            key,
            version,
        })
    }

    /// Build the 101 Switching Protocols response for this request.
    #[must_use]
    pub fn accept_response(&self) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {accept}\r\n\
             \r\n",
            accept = compute_accept_key(&self.key),
        )
    }
}
