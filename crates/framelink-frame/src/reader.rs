use std::io::{ErrorKind, Read};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use framelink_transport::Timeouts;
use tracing::trace;

use crate::buffer::Buffer;
use crate::codec::{decode_frame, FrameConfig};
use crate::deadline::{is_timeout_kind, Deadline};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from a stream.
///
/// Handles partial reads internally, callers always get complete frames.
/// Bytes received past the end of a frame stay in the reader's scratch
/// buffer for the next call, and so do the bytes of a frame whose read timed
/// out, so a deadline expiry never loses stream position.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read + Timeouts> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame payload (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        self.next_frame().map(BytesMut::freeze)
    }

    /// Read the next complete frame payload into `dst` (blocking).
    ///
    /// `dst` is reset first; on success it holds exactly the payload with the
    /// cursor at its start. On error `dst` is left empty.
    pub fn read_frame_into(&mut self, dst: &mut Buffer) -> Result<()> {
        dst.reset();
        let frame = self.next_frame()?;
        dst.fill_from(&frame);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<BytesMut> {
        let deadline = Deadline::start(self.config.read_timeout);
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_frame_size)? {
                trace!(size = frame.len(), "frame read");
                return Ok(frame);
            }

            if let Some(left) = deadline.remaining()? {
                self.inner.set_read_timeout(Some(left))?;
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if deadline.is_armed() && is_timeout_kind(err.kind()) => {
                    return Err(deadline.expired());
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Number of received bytes not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Update maximum frame size for subsequent reads.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Update the per-frame read deadline.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        if timeout.is_none() {
            self.inner.set_read_timeout(None)?;
        }
        self.config.read_timeout = timeout;
        Ok(())
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
