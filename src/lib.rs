//! # sockline - Asynchronous WebSocket Client
//!
//! `sockline` is a tokio-based WebSocket client library with fan-out
//! subscriptions and heartbeat liveness detection.
//!
//! ## Features
//!
//! - **RFC 6455 framing** with strict validation and bounded resource use
//! - **Concurrent callers**: any number of tasks can send and `receive()`
//!   on one connection without stepping on each other
//! - **Fan-out subscriptions**: every inbound message is delivered to each
//!   live [`MessageStream`], independent of direct `receive()` callers
//! - **Typed receive**: JSON decoding with retry-on-decode-failure
//! - **Heartbeat**: periodic ping/pong with one-miss-is-fatal teardown
//! - **TLS** via the `tls-rustls` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sockline::{Config, WebSocket};
//!
//! let config = Config::new().with_insecure_connections(true);
//! let ws = WebSocket::new("ws://localhost:9001/feed", config)?;
//! ws.connect().await?;
//!
//! let mut updates = ws.messages();
//! ws.send_text("subscribe").await?;
//! while let Some(msg) = updates.recv().await {
//!     println!("{msg:?}");
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod subscription;

mod heartbeat;
mod hub;
mod util;

#[cfg(feature = "tls-rustls")]
mod tls;

pub use client::WebSocket;
pub use config::{Config, Limits, MIN_HEARTBEAT_INTERVAL};
pub use connection::ConnectionState;
pub use error::{Error, ProtocolError, Result, TransportError};
pub use message::{CloseCode, Message, SocketEvent};
pub use subscription::{EventStream, MessageStream, TypedStream};
