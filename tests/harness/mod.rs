//! Shared test harness: an in-process WebSocket echo server.

mod server;

#[allow(unused_imports)]
pub use server::{ServerOptions, TestServer};
