//! Frame codec bound to async byte-stream halves.

mod framed;

pub use framed::{FrameReader, FrameWriter, Role};
