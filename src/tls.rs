//! Rustls-based TLS for `wss://` endpoints (feature `tls-rustls`).

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::{Result, TransportError};

/// Wrap an established TCP stream in a client TLS session against `host`,
/// verified with the webpki root store.
///
/// # Errors
///
/// Returns [`TransportError::Tls`] on an invalid server name or a failed
/// TLS handshake.
pub(crate) async fn wrap_client(tcp: TcpStream, host: &str) -> Result<TlsStream<TcpStream>> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| TransportError::Tls(format!("invalid server name: {host:?}")))?;

    let connector = TlsConnector::from(Arc::new(config));
    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| TransportError::Tls(e.to_string()).into())
}
