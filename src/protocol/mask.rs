//! Payload masking (RFC 6455 Section 5.3).

/// XOR `data` in place with the 4-byte masking key.
///
/// Masking is its own inverse, so the same call masks and unmasks.
/// Processes a word at a time with a byte-wise tail.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    let key_word = u32::from_ne_bytes(key);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key_word;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= key[i];
    }
}

/// Generate a random 4-byte masking key.
///
/// Falls back to a time-derived key if the system entropy source fails.
#[must_use]
pub fn random_key() -> [u8; 4] {
    let mut key = [0u8; 4];
    if getrandom::getrandom(&mut key).is_ok() {
        key
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x9E37_79B9);
        nanos.to_le_bytes()
    }
}
