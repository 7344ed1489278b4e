//! Reassembly of fragmented frames into complete messages.
//!
//! Dispatch happens strictly on complete messages: continuation frames are
//! buffered here until FIN.

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{ProtocolError, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Buffers data-frame fragments and yields a [`Message`] at FIN.
pub struct MessageAssembler {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    fragment_count: usize,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            opcode: None,
            fragment_count: 0,
            limits,
        }
    }

    /// Add a data frame. Returns `Some(message)` once FIN completes the
    /// message, `None` while more fragments are expected. Control frames are
    /// ignored (they may interleave with fragments per RFC 6455).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::BadDataFormat`] on fragmentation-order violations
    /// - [`ProtocolError::MessageTooLarge`] / [`ProtocolError::TooManyFragments`]
    ///   when limits are exceeded
    /// - [`ProtocolError::InvalidUtf8`] if a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        if frame.opcode == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(
                    ProtocolError::BadDataFormat("continuation frame without a start".into())
                        .into(),
                );
            }
        } else {
            if self.opcode.is_some() {
                return Err(ProtocolError::BadDataFormat(
                    "new data frame while a fragmented message is in progress".into(),
                )
                .into());
            }
            self.opcode = Some(frame.opcode);
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        let opcode = self.opcode.take();
        self.fragment_count = 0;

        match opcode {
            Some(OpCode::Text) => {
                let text =
                    String::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;
                Ok(Some(Message::Text(text)))
            }
            _ => Ok(Some(Message::Binary(payload))),
        }
    }

    /// Whether a fragmented message is currently in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }
}
