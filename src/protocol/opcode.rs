//! WebSocket frame opcodes as defined in RFC 6455.

use crate::error::{ProtocolError, Result};

/// Frame type tag. Defines the interpretation of the payload data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[non_exhaustive]
pub enum OpCode {
    /// Continuation frame (0x0), carries a fragment of the current message.
    Continuation = 0x0,
    /// Text frame (0x1). Payload must be valid UTF-8 once reassembled.
    Text = 0x1,
    /// Binary frame (0x2).
    Binary = 0x2,
    /// Close frame (0x8). May carry a status code and reason.
    Close = 0x8,
    /// Ping frame (0x9). The receiver answers with a pong.
    Ping = 0x9,
    /// Pong frame (0xA).
    Pong = 0xA,
}

impl OpCode {
    /// Create an `OpCode` from its raw wire value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BadDataFormat`] for reserved or out-of-range
    /// values; without extension negotiation no reserved opcode is ever
    /// legitimate.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => {
                Err(ProtocolError::BadDataFormat(format!("unrecognized opcode {other:#x}")).into())
            }
        }
    }

    /// Raw wire value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Control frame opcodes: close, ping, pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Data frame opcodes: continuation, text, binary.
    #[inline]
    #[must_use]
    pub const fn is_data(self) -> bool {
        !self.is_control()
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpCode::Continuation => "Continuation",
            OpCode::Text => "Text",
            OpCode::Binary => "Binary",
            OpCode::Close => "Close",
            OpCode::Ping => "Ping",
            OpCode::Pong => "Pong",
        };
        f.write_str(name)
    }
}
