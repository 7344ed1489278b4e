//! Property-based and boundary tests for the frame codec.

use proptest::prelude::*;

use sockline::protocol::{Frame, OpCode, apply_mask};

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Continuation),
    ]
}

proptest! {
    // Roundtrip: parse(encode(frame)) preserves fin, opcode, and payload.
    #[test]
    fn prop_roundtrip_unmasked(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let bytes = frame.encode(None);
        prop_assert_eq!(bytes.len(), frame.wire_size(false));

        let (parsed, consumed) = Frame::parse(&bytes).unwrap();
        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(parsed.fin, frame.fin);
        prop_assert_eq!(parsed.opcode, frame.opcode);
        prop_assert_eq!(parsed.payload(), frame.payload());
    }

    // Masked roundtrip: the key is randomized per frame, so equality is on
    // the unmasked payload, not the wire bytes.
    #[test]
    fn prop_roundtrip_masked(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..500),
        mask in any::<[u8; 4]>()
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let bytes = frame.encode(Some(mask));
        prop_assert_eq!(bytes.len(), frame.wire_size(true));

        let (parsed, consumed) = Frame::parse(&bytes).unwrap();
        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(parsed.fin, frame.fin);
        prop_assert_eq!(parsed.opcode, frame.opcode);
        prop_assert_eq!(parsed.payload(), frame.payload());
    }

    // XOR masking is self-inverse.
    #[test]
    fn prop_mask_reversible(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(data, masked);
    }

    // The length encoding picks the right field width for any size.
    #[test]
    fn prop_length_encoding(payload in prop::collection::vec(any::<u8>(), 0..70000)) {
        let frame = Frame::binary(payload.clone());
        let bytes = frame.encode(None);

        let expected_header = if payload.len() <= 125 {
            2
        } else if payload.len() <= 65535 {
            4
        } else {
            10
        };
        prop_assert_eq!(bytes.len(), expected_header + payload.len());

        let (parsed, _) = Frame::parse(&bytes).unwrap();
        prop_assert_eq!(parsed.payload().len(), payload.len());
    }

    // Any truncation of a valid frame parses as incomplete or fails; it
    // never yields a frame.
    #[test]
    fn prop_truncation_never_garbage(
        payload in prop::collection::vec(any::<u8>(), 1..300),
        cut in any::<prop::sample::Index>()
    ) {
        let bytes = Frame::binary(payload).encode(None);
        let cut = cut.index(bytes.len() - 1); // strictly shorter than the frame
        prop_assert!(Frame::parse(&bytes[..cut]).is_err());
    }
}

#[test]
fn test_boundary_payload_sizes() {
    // The sizes that straddle each length-field width.
    for size in [0usize, 1, 125, 126, 65535, 65536] {
        let payload: Vec<u8> = (0..size).map(|i| i as u8).collect();

        let unmasked = Frame::binary(payload.clone()).encode(None);
        let (parsed, consumed) = Frame::parse(&unmasked).unwrap();
        assert_eq!(consumed, unmasked.len(), "size {size}");
        assert_eq!(parsed.payload(), &payload[..], "size {size}");

        let masked = Frame::binary(payload.clone()).encode(Some([0xa5, 0x5a, 0x0f, 0xf0]));
        let (parsed, consumed) = Frame::parse(&masked).unwrap();
        assert_eq!(consumed, masked.len(), "masked size {size}");
        assert_eq!(parsed.payload(), &payload[..], "masked size {size}");
    }
}

#[test]
fn test_one_byte_buffer_is_incomplete() {
    assert!(Frame::parse(&[0x81]).is_err());
    assert!(Frame::parse(&[]).is_err());
}

#[test]
fn test_declared_length_exceeding_buffer_is_incomplete() {
    // 16-bit length field claims 300 bytes; only 4 are present.
    let data = [0x82, 0x7e, 0x01, 0x2c, 0xde, 0xad, 0xbe, 0xef];
    assert!(Frame::parse(&data).is_err());
}

#[test]
fn test_control_frames_through_general_path() {
    for frame in [
        Frame::ping(b"p".to_vec()),
        Frame::pong(Vec::new()),
        Frame::close(Some(1001), "going away"),
    ] {
        let bytes = frame.encode(Some([9, 8, 7, 6]));
        let (parsed, _) = Frame::parse(&bytes).unwrap();
        assert_eq!(parsed.opcode, frame.opcode);
        assert_eq!(parsed.payload(), frame.payload());
    }
}
