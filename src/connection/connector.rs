//! Dialing: endpoint parsing, TCP (and optionally TLS) connection setup,
//! and the client side of the HTTP upgrade handshake.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::Config;
use crate::error::{ProtocolError, Result, TransportError};
use crate::protocol::handshake::{ClientHandshake, MAX_HANDSHAKE_SIZE, find_header_end};

/// Object-safe alias for the byte streams a connection can run over.
pub(crate) trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// The established transport plus any bytes the server sent after the
/// handshake response in the same read.
pub(crate) type DialOutcome = (Box<dyn AsyncStream>, BytesMut);

/// A parsed `ws://` or `wss://` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    /// Parse a WebSocket URL of the form `ws[s]://host[:port][/path]`.
    pub(crate) fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| ProtocolError::ConnectFailed(format!("invalid url: {url:?}")))?;
        let secure = match scheme {
            "ws" => false,
            "wss" => true,
            other => {
                return Err(ProtocolError::ConnectFailed(format!(
                    "unsupported scheme: {other:?}"
                ))
                .into());
            }
        };

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], rest[i..].to_string()),
            None => (rest, "/".to_string()),
        };
        if authority.is_empty() {
            return Err(ProtocolError::ConnectFailed(format!("missing host in {url:?}")).into());
        }

        let default_port = if secure { 443 } else { 80 };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port_str)) if !host.is_empty() => {
                let port = port_str.parse().map_err(|_| {
                    ProtocolError::ConnectFailed(format!("invalid port: {port_str:?}"))
                })?;
                (host.to_string(), port)
            }
            _ => (authority.to_string(), default_port),
        };

        Ok(Self {
            secure,
            host,
            port,
            path,
        })
    }

    /// Host header value.
    pub(crate) fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.secure { "wss" } else { "ws" };
        write!(f, "{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Connect the transport and complete the upgrade handshake.
///
/// # Errors
///
/// - [`ProtocolError::ConnectFailed`] for policy violations (insecure
///   endpoint without [`Config::allow_insecure_connections`], missing TLS
///   support)
/// - [`TransportError::TimedOut`] if dial + handshake exceed the configured
///   connect timeout
/// - [`ProtocolError::InvalidHandshake`] if the server rejects the upgrade
pub(crate) async fn dial(endpoint: &Endpoint, config: &Config) -> Result<DialOutcome> {
    if !endpoint.secure && !config.allow_insecure_connections {
        return Err(ProtocolError::ConnectFailed(
            "insecure ws:// endpoint rejected; set allow_insecure_connections".into(),
        )
        .into());
    }

    let attempt = establish(endpoint, config);
    match tokio::time::timeout(config.connect_timeout, attempt).await {
        Ok(outcome) => outcome,
        Err(_) => Err(TransportError::TimedOut.into()),
    }
}

async fn establish(endpoint: &Endpoint, config: &Config) -> Result<DialOutcome> {
    debug!(endpoint = %endpoint, "dialing");
    let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    if config.tcp_nodelay {
        tcp.set_nodelay(true)?;
    }

    if endpoint.secure {
        #[cfg(feature = "tls-rustls")]
        {
            let tls = crate::tls::wrap_client(tcp, &endpoint.host).await?;
            let mut stream: Box<dyn AsyncStream> = Box::new(tls);
            let leftover = upgrade(&mut stream, endpoint).await?;
            return Ok((stream, leftover));
        }
        #[cfg(not(feature = "tls-rustls"))]
        {
            return Err(ProtocolError::ConnectFailed(
                "wss:// endpoint requires the tls-rustls feature".into(),
            )
            .into());
        }
    }

    let mut stream: Box<dyn AsyncStream> = Box::new(tcp);
    let leftover = upgrade(&mut stream, endpoint).await?;
    Ok((stream, leftover))
}

/// Run the client upgrade over the established stream. Returns bytes read
/// past the end of the response headers; they belong to the frame layer.
async fn upgrade(stream: &mut Box<dyn AsyncStream>, endpoint: &Endpoint) -> Result<BytesMut> {
    let handshake = ClientHandshake::new();
    let request = handshake.request(&endpoint.authority(), &endpoint.path);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = find_header_end(&buf) {
            handshake.validate_response(&buf[..end])?;
            debug!(endpoint = %endpoint, "handshake complete");
            let leftover = buf.split_off(end);
            return Ok(leftover);
        }
        if buf.len() > MAX_HANDSHAKE_SIZE {
            return Err(ProtocolError::InvalidHandshake("oversized response".into()).into());
        }
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(
                ProtocolError::InvalidHandshake("connection closed during handshake".into())
                    .into(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_parse_basic_ws_url() {
        let ep = Endpoint::parse("ws://localhost:9001/feed").unwrap();
        assert!(!ep.secure);
        assert_eq!(ep.host, "localhost");
        assert_eq!(ep.port, 9001);
        assert_eq!(ep.path, "/feed");
        assert_eq!(ep.authority(), "localhost:9001");
    }

    #[test]
    fn test_parse_default_ports() {
        assert_eq!(Endpoint::parse("ws://example.com").unwrap().port, 80);
        assert_eq!(Endpoint::parse("wss://example.com").unwrap().port, 443);
    }

    #[test]
    fn test_parse_default_path() {
        assert_eq!(Endpoint::parse("ws://example.com:8080").unwrap().path, "/");
        assert_eq!(
            Endpoint::parse("ws://example.com:8080/a/b?q=1").unwrap().path,
            "/a/b?q=1"
        );
    }

    #[test]
    fn test_parse_wss_is_secure() {
        assert!(Endpoint::parse("wss://example.com/x").unwrap().secure);
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        for url in [
            "http://example.com",
            "example.com",
            "ws://",
            "ws://host:notaport/",
        ] {
            assert!(
                matches!(
                    Endpoint::parse(url),
                    Err(Error::Protocol(ProtocolError::ConnectFailed(_)))
                ),
                "expected failure for {url:?}"
            );
        }
    }

    #[test]
    fn test_display() {
        let ep = Endpoint::parse("ws://localhost:9001/feed").unwrap();
        assert_eq!(ep.to_string(), "ws://localhost:9001/feed");
    }

    #[tokio::test]
    async fn test_dial_rejects_insecure_by_default() {
        let ep = Endpoint::parse("ws://127.0.0.1:1/x").unwrap();
        let result = dial(&ep, &Config::new()).await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::ConnectFailed(_)))
        ));
    }
}
