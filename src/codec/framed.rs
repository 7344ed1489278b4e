//! Buffered frame reading and writing over split stream halves.
//!
//! The reader and writer are separate because a client connection reads from
//! a dedicated driver task while any caller task may be writing.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::error::{Result, TransportError};
use crate::protocol::Frame;
use crate::protocol::mask::random_key;

const READ_CHUNK: usize = 8 * 1024;

/// Which side of the connection this endpoint is.
///
/// Clients must mask every outbound frame; servers must not (RFC 6455
/// Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client endpoint: outbound frames are masked.
    Client,
    /// Server endpoint: outbound frames are not masked.
    Server,
}

impl Role {
    /// Whether outbound frames from this role carry a masking key.
    #[must_use]
    pub const fn must_mask(self) -> bool {
        matches!(self, Role::Client)
    }
}

/// Reads frames from an async byte stream, buffering partial input.
pub struct FrameReader<R> {
    io: R,
    buf: BytesMut,
    limits: Limits,
}

impl<R> FrameReader<R> {
    /// Create a reader with an empty buffer.
    #[must_use]
    pub fn new(io: R, limits: Limits) -> Self {
        Self::with_buffer(io, limits, BytesMut::new())
    }

    /// Create a reader seeded with bytes already pulled off the stream
    /// (e.g. trailing data read together with the handshake response).
    #[must_use]
    pub fn with_buffer(io: R, limits: Limits, buf: BytesMut) -> Self {
        Self { io, buf, limits }
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next complete frame.
    ///
    /// Incomplete parses are retried after reading more bytes; any other
    /// parse failure propagates.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotConnected`] on EOF
    /// - [`crate::ProtocolError::FrameTooLarge`] if the frame exceeds limits
    /// - Malformed-header errors from [`Frame::parse`]
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if self.buf.len() >= 2 {
                match Frame::parse(&self.buf) {
                    Ok((frame, consumed)) => {
                        self.limits.check_frame_size(frame.payload().len())?;
                        self.buf.advance(consumed);
                        frame.validate()?;
                        return Ok(frame);
                    }
                    Err(e) if e.is_incomplete() => {}
                    Err(e) => return Err(e),
                }
            }

            self.buf.reserve(READ_CHUNK);
            let n = self.io.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(TransportError::NotConnected.into());
            }
        }
    }
}

/// Writes frames to an async byte stream, masking per [`Role`].
pub struct FrameWriter<W> {
    io: W,
    role: Role,
}

impl<W> FrameWriter<W> {
    /// Create a writer for the given role.
    #[must_use]
    pub fn new(io: W, role: Role) -> Self {
        Self { io, role }
    }

    /// The writer's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Serialize and write one frame, flushing it to the stream.
    ///
    /// # Errors
    ///
    /// Classified transport errors from the underlying stream.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.role.must_mask().then(random_key);
        let bytes = frame.encode(mask);
        self.io.write_all(&bytes).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write side of the stream.
    ///
    /// # Errors
    ///
    /// Classified transport errors from the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
