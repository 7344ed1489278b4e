//! Wire-level protocol: opcodes, frames, masking, and the upgrade handshake.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use frame::Frame;
pub use handshake::{WS_GUID, compute_accept_key};
pub use mask::apply_mask;
pub use opcode::OpCode;
