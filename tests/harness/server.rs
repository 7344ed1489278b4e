//! In-process WebSocket server for integration tests.
//!
//! Accepts real TCP connections, performs the server side of the upgrade
//! handshake with the crate's own handshake types, then echoes data frames.
//! Behavior knobs cover the heartbeat tests (a server that never pongs) and
//! the close tests (counting close frames received).

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use sockline::Limits;
use sockline::codec::{FrameReader, FrameWriter, Role};
use sockline::protocol::handshake::{HandshakeRequest, find_header_end};
use sockline::protocol::{Frame, OpCode};

/// Behavior knobs for a spawned server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Echo inbound text/binary frames back.
    pub echo: bool,
    /// Answer pings with pongs.
    pub auto_pong: bool,
    /// Initiate a Normal close after this many data frames.
    pub close_after: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            echo: true,
            auto_pong: true,
            close_after: None,
        }
    }
}

pub struct TestServer {
    addr: SocketAddr,
    close_frames: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl TestServer {
    /// Spawn an echo server with default behavior on an ephemeral port.
    pub async fn spawn() -> TestServer {
        Self::spawn_with(ServerOptions::default()).await
    }

    /// Spawn a server with explicit behavior.
    pub async fn spawn_with(options: ServerOptions) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let close_frames = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&close_frames);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let options = options.clone();
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, options, counter).await;
                });
            }
        });

        TestServer {
            addr,
            close_frames,
            accept_task,
        }
    }

    /// `ws://` URL of this server.
    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    /// Total close frames received across all connections.
    pub fn close_frames_received(&self) -> usize {
        self.close_frames.load(Ordering::SeqCst)
    }

    pub fn shutdown(self) {
        self.accept_task.abort();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    options: ServerOptions,
    close_frames: Arc<AtomicUsize>,
) -> std::io::Result<()> {
    // Read the upgrade request and answer it.
    let mut head = BytesMut::with_capacity(1024);
    let leftover = loop {
        if let Some(end) = find_header_end(&head) {
            let request = HandshakeRequest::parse(&head[..end]).expect("valid upgrade request");
            stream
                .write_all(request.accept_response().as_bytes())
                .await?;
            stream.flush().await?;
            break head.split_off(end);
        }
        if stream.read_buf(&mut head).await? == 0 {
            return Ok(());
        }
    };

    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::with_buffer(read_half, Limits::default(), leftover);
    let mut writer = FrameWriter::new(write_half, Role::Server);
    let mut data_frames = 0usize;

    loop {
        let Ok(frame) = reader.read_frame().await else {
            return Ok(());
        };
        match frame.opcode {
            OpCode::Ping => {
                if options.auto_pong {
                    let _ = writer.write_frame(&Frame::pong(frame.into_payload())).await;
                }
            }
            OpCode::Close => {
                close_frames.fetch_add(1, Ordering::SeqCst);
                let _ = writer
                    .write_frame(&Frame::close(frame.close_status(), ""))
                    .await;
                return Ok(());
            }
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                data_frames += 1;
                if options.echo {
                    let echoed = Frame::new(frame.fin, frame.opcode, frame.into_payload());
                    let _ = writer.write_frame(&echoed).await;
                }
                if options.close_after.is_some_and(|n| data_frames >= n) {
                    let _ = writer.write_frame(&Frame::close(Some(1000), "done")).await;
                    return Ok(());
                }
            }
            // Pong (and any future opcode): nothing for the harness to do.
            _ => {}
        }
    }
}
