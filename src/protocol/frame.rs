//! WebSocket frame parsing and serialization (RFC 6455).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                 Masking key (if MASK set)                     |
//! +---------------------------------------------------------------+
//! |                       Payload data                            |
//! +---------------------------------------------------------------+
//! ```

use crate::error::{ProtocolError, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// A single WebSocket frame.
///
/// Parsing unmasks the payload, so `payload()` always returns the raw
/// application bytes regardless of the wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame type.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with the given parameters.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            opcode,
            payload,
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = code.to_be_bytes().to_vec();
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// The unmasked payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// The status code of a close frame, if the payload carries one.
    #[must_use]
    pub fn close_status(&self) -> Option<u16> {
        if self.opcode == OpCode::Close && self.payload.len() >= 2 {
            Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
        } else {
            None
        }
    }

    /// Parse one frame from the start of `buf`.
    ///
    /// Returns the frame and the number of bytes consumed. Masked payloads
    /// are unmasked during parsing.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::IncompleteFrame`] if `buf` holds fewer bytes than
    ///   header + mask + declared payload (fail-soft: read more and retry)
    /// - [`ProtocolError::BadDataFormat`] for unrecognized opcodes, reserved
    ///   bits, or a length that does not fit the platform
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 2 {
            return Err(ProtocolError::IncompleteFrame {
                needed: 2 - buf.len(),
            }
            .into());
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        let fin = (byte0 & 0x80) != 0;
        if byte0 & 0x70 != 0 {
            // RSV bits require a negotiated extension; we negotiate none.
            return Err(ProtocolError::BadDataFormat("reserved bits set".into()).into());
        }
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;

        let masked = (byte1 & 0x80) != 0;
        let len_indicator = byte1 & 0x7F;

        let (payload_len, header_len): (usize, usize) = match len_indicator {
            0..=125 => (len_indicator as usize, 2),
            126 => {
                if buf.len() < 4 {
                    return Err(ProtocolError::IncompleteFrame {
                        needed: 4 - buf.len(),
                    }
                    .into());
                }
                (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
            }
            127 => {
                if buf.len() < 10 {
                    return Err(ProtocolError::IncompleteFrame {
                        needed: 10 - buf.len(),
                    }
                    .into());
                }
                let len = u64::from_be_bytes([
                    buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
                ]);
                let len = usize::try_from(len).map_err(|_| {
                    ProtocolError::BadDataFormat(format!(
                        "declared payload length {len} exceeds platform maximum"
                    ))
                })?;
                (len, 10)
            }
            _ => unreachable!(),
        };

        let mask_len = if masked { 4 } else { 0 };
        let total_len = header_len
            .checked_add(mask_len)
            .and_then(|n| n.checked_add(payload_len))
            .ok_or_else(|| {
                ProtocolError::BadDataFormat("frame length overflows platform maximum".into())
            })?;

        if buf.len() < total_len {
            return Err(ProtocolError::IncompleteFrame {
                needed: total_len - buf.len(),
            }
            .into());
        }

        let payload_start = header_len + mask_len;
        let mut payload = buf[payload_start..total_len].to_vec();
        if masked {
            let key = [
                buf[header_len],
                buf[header_len + 1],
                buf[header_len + 2],
                buf[header_len + 3],
            ];
            apply_mask(&mut payload, key);
        }

        Ok((
            Frame {
                fin,
                opcode,
                payload,
            },
            total_len,
        ))
    }

    /// Serialize this frame, masking the payload with `mask` when given.
    ///
    /// Clients mask every frame; servers never do.
    #[must_use]
    pub fn encode(&self, mask: Option<[u8; 4]>) -> Vec<u8> {
        let payload_len = self.payload.len();
        let mut buf = Vec::with_capacity(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        buf.push(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        if payload_len <= 125 {
            buf.push(mask_bit | payload_len as u8);
        } else if payload_len <= 65535 {
            buf.push(mask_bit | 126);
            buf.extend_from_slice(&(payload_len as u16).to_be_bytes());
        } else {
            buf.push(mask_bit | 127);
            buf.extend_from_slice(&(payload_len as u64).to_be_bytes());
        }

        match mask {
            Some(key) => {
                buf.extend_from_slice(&key);
                let payload_start = buf.len();
                buf.extend_from_slice(&self.payload);
                apply_mask(&mut buf[payload_start..], key);
            }
            None => buf.extend_from_slice(&self.payload),
        }

        buf
    }

    /// Number of bytes `encode` will produce.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        2 + extended + if masked { 4 } else { 0 } + payload_len
    }

    /// Validate control-frame constraints (RFC 6455 Section 5.5).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FragmentedControlFrame`] if a control frame has FIN=0
    /// - [`ProtocolError::ControlFrameTooLarge`] if a control payload exceeds
    ///   125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.opcode.is_control() {
            if !self.fin {
                return Err(ProtocolError::FragmentedControlFrame.into());
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(ProtocolError::ControlFrameTooLarge(self.payload.len()).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_parse_unmasked_text_frame() {
        let data = &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 7);
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_masked_text_frame() {
        let data = &[
            0x81, 0x85, // FIN + Text, MASK + len=5
            0x37, 0xfa, 0x21, 0x3d, // mask key
            0x7f, 0x9f, 0x4d, 0x51, 0x58, // masked "Hello"
        ];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 11);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_control_frames() {
        let (ping, _) = Frame::parse(&[0x89, 0x04, 0x70, 0x69, 0x6e, 0x67]).unwrap();
        assert_eq!(ping.opcode, OpCode::Ping);
        assert_eq!(ping.payload(), b"ping");

        let (pong, _) = Frame::parse(&[0x8a, 0x04, 0x70, 0x6f, 0x6e, 0x67]).unwrap();
        assert_eq!(pong.opcode, OpCode::Pong);

        let (close, _) = Frame::parse(&[0x88, 0x02, 0x03, 0xe8]).unwrap();
        assert_eq!(close.opcode, OpCode::Close);
        assert_eq!(close.close_status(), Some(1000));
    }

    #[test]
    fn test_close_status_empty_payload() {
        let (close, _) = Frame::parse(&[0x88, 0x00]).unwrap();
        assert_eq!(close.close_status(), None);
        assert_eq!(Frame::text("x").close_status(), None);
    }

    #[test]
    fn test_parse_fragmented_pair() {
        let (first, _) = Frame::parse(&[0x01, 0x03, 0x48, 0x65, 0x6c]).unwrap();
        assert!(!first.fin);
        assert_eq!(first.opcode, OpCode::Text);

        let (cont, _) = Frame::parse(&[0x80, 0x02, 0x6c, 0x6f]).unwrap();
        assert!(cont.fin);
        assert_eq!(cont.opcode, OpCode::Continuation);
        assert_eq!(cont.payload(), b"lo");
    }

    #[test]
    fn test_parse_reserved_bits_rejected() {
        let result = Frame::parse(&[0xc1, 0x00]); // RSV1 set
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::BadDataFormat(_)))
        ));
    }

    #[test]
    fn test_parse_unrecognized_opcode() {
        let result = Frame::parse(&[0x83, 0x00]);
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::BadDataFormat(_)))
        ));
    }

    #[test]
    fn test_parse_truncated_inputs() {
        // One header byte.
        assert!(matches!(
            Frame::parse(&[0x81]),
            Err(Error::Protocol(ProtocolError::IncompleteFrame { needed: 1 }))
        ));
        // Declared payload longer than the buffer.
        assert!(matches!(
            Frame::parse(&[0x81, 0x05, 0x48, 0x65, 0x6c]),
            Err(Error::Protocol(ProtocolError::IncompleteFrame { needed: 2 }))
        ));
        // Truncated 16-bit extended length.
        assert!(matches!(
            Frame::parse(&[0x82, 0x7e, 0x01]),
            Err(Error::Protocol(ProtocolError::IncompleteFrame { needed: 1 }))
        ));
        // Truncated 64-bit extended length.
        assert!(matches!(
            Frame::parse(&[0x82, 0x7f, 0x00, 0x00, 0x00]),
            Err(Error::Protocol(ProtocolError::IncompleteFrame { needed: 5 }))
        ));
        // Truncated mask key.
        assert!(matches!(
            Frame::parse(&[0x81, 0x85, 0x37, 0xfa]),
            Err(Error::Protocol(ProtocolError::IncompleteFrame { .. }))
        ));
    }

    #[test]
    fn test_parse_huge_declared_length() {
        let mut data = vec![0x82, 0xFF];
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        data.extend_from_slice(&[0x00; 4]);
        // Either rejected outright (32-bit) or incomplete (64-bit); never a
        // partial frame.
        assert!(Frame::parse(&data).is_err());
    }

    #[test]
    fn test_encode_unmasked() {
        let frame = Frame::text("Hello");
        let bytes = frame.encode(None);
        assert_eq!(bytes, vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn test_encode_masked() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let bytes = Frame::text("Hello").encode(Some(mask));
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1], 0x85);
        assert_eq!(&bytes[2..6], &mask);
        assert_eq!(&bytes[6..], &[0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_length_field_boundaries() {
        // Sizes that straddle the 7/16/64-bit length encodings.
        for (size, header) in [
            (0usize, 2usize),
            (1, 2),
            (125, 2),
            (126, 4),
            (65535, 4),
            (65536, 10),
        ] {
            let frame = Frame::binary(vec![0xAB; size]);
            let bytes = frame.encode(None);
            assert_eq!(bytes.len(), header + size, "size {size}");

            let (parsed, consumed) = Frame::parse(&bytes).unwrap();
            assert_eq!(consumed, bytes.len(), "size {size}");
            assert_eq!(parsed.payload().len(), size, "size {size}");
        }
    }

    #[test]
    fn test_roundtrip_masked() {
        let original = Frame::binary(vec![0x00, 0xff, 0x7f, 0x80, 0x01]);
        let bytes = original.encode(Some([0x12, 0x34, 0x56, 0x78]));
        let (parsed, consumed) = Frame::parse(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.fin, original.fin);
        assert_eq!(parsed.opcode, original.opcode);
        assert_eq!(parsed.payload(), original.payload());
    }

    #[test]
    fn test_wire_size_matches_encode() {
        for size in [0, 1, 125, 126, 300, 65535, 65536] {
            let frame = Frame::binary(vec![0u8; size]);
            assert_eq!(frame.encode(None).len(), frame.wire_size(false));
            assert_eq!(
                frame.encode(Some([1, 2, 3, 4])).len(),
                frame.wire_size(true)
            );
        }
    }

    #[test]
    fn test_validate_control_frames() {
        assert!(Frame::ping(vec![0u8; 125]).validate().is_ok());
        assert!(matches!(
            Frame::ping(vec![0u8; 126]).validate(),
            Err(Error::Protocol(ProtocolError::ControlFrameTooLarge(126)))
        ));

        let mut fragmented = Frame::pong(b"x".to_vec());
        fragmented.fin = false;
        assert!(matches!(
            fragmented.validate(),
            Err(Error::Protocol(ProtocolError::FragmentedControlFrame))
        ));

        assert!(Frame::text("data").validate().is_ok());
    }

    #[test]
    fn test_close_frame_with_reason() {
        let frame = Frame::close(Some(1001), "going away");
        assert_eq!(frame.close_status(), Some(1001));
        assert_eq!(&frame.payload()[2..], b"going away");

        let bare = Frame::close(None, "ignored without code");
        assert!(bare.payload().is_empty());
    }
}
