use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: a single big-endian u32 payload length.
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 64 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Default read and write deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Encode one frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────────────┬──────────────────┐
/// │ Length (4B, BE)    │ Payload          │
/// │ = payload length   │ (Length bytes)   │
/// └────────────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = checked_len(payload.len())?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(len);
    dst.put_slice(payload);
    Ok(())
}

/// Peek the declared payload length, if the header is complete.
pub fn peek_length(src: &[u8]) -> Option<usize> {
    let header: [u8; HEADER_SIZE] = src.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(header) as usize)
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` if `src` doesn't contain a complete frame yet. The
/// length check happens as soon as the header is available, before any of
/// the payload has to arrive. On success the frame bytes are consumed.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<BytesMut>> {
    let Some(payload_len) = peek_length(src) else {
        return Ok(None);
    };

    if payload_len > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: payload_len,
            max: max_frame_size,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        src.reserve(HEADER_SIZE + payload_len - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len)))
}

pub(crate) fn checked_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| FrameError::FrameTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

/// Configuration for framing a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 64 MiB.
    pub max_frame_size: usize,
    /// Deadline for reading one whole frame. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Deadline for writing one whole frame. `None` waits forever.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: Some(DEFAULT_TIMEOUT),
            write_timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl FrameConfig {
    /// Config with no deadlines, for in-memory streams and tests.
    pub fn unbounded() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            ..Self::default()
        }
    }
}
