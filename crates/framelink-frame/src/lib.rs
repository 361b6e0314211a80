//! Length-prefixed binary framing for framelink.
//!
//! Every frame on the wire is a 4-byte big-endian payload length followed by
//! the payload itself. This crate turns a raw duplex stream into whole
//! frames: partial reads are reassembled internally, oversized frames are
//! rejected before their payload is consumed, and every blocking operation
//! runs under its own deadline.
//!
//! Payload memory is handed out through the [`BufferPool`] capability so the
//! higher layers can recycle allocations across frames.

pub mod buffer;
pub mod channel;
pub mod codec;
mod deadline;
pub mod error;
pub mod pool;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use buffer::Buffer;
pub use channel::{FramedChannel, ShutdownHandle};
pub use codec::{
    decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_FRAME_SIZE, DEFAULT_TIMEOUT, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use pool::{BufferPool, FreeListPool, HeapPool};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::LengthPrefixCodec;
