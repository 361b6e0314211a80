use bytes::{BufMut, BytesMut};

use crate::codec::{checked_len, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Growable byte buffer with a read cursor.
///
/// Writes always append. Reads consume from the cursor forward, so a buffer
/// holding an inbound frame can be parsed field by field and the unread tail
/// handed to the application.
///
/// A buffer may reserve a 4-byte length head ([`Buffer::reset_with_head`]).
/// The head is filled in by the frame writer right before the buffer goes on
/// the wire, which lets a whole outbound frame be built in place without a
/// second copy.
#[derive(Debug, Default)]
pub struct Buffer {
    data: BytesMut,
    pos: usize,
    headed: bool,
}

impl Buffer {
    /// Create an empty buffer without allocating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            pos: 0,
            headed: false,
        }
    }

    /// Clear contents and cursor, keeping the allocation.
    pub fn reset(&mut self) -> &mut Self {
        self.data.clear();
        self.pos = 0;
        self.headed = false;
        self
    }

    /// Clear contents and reserve a 4-byte length head at the front.
    ///
    /// The cursor is placed after the head, so reads never see it.
    pub fn reset_with_head(&mut self) -> &mut Self {
        self.data.clear();
        self.data.put_bytes(0, HEADER_SIZE);
        self.pos = HEADER_SIZE;
        self.headed = true;
        self
    }

    /// Whether the first four bytes are a reserved length head.
    pub fn has_head(&self) -> bool {
        self.headed
    }

    /// Total number of bytes held, including a reserved head.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// All bytes held, including a reserved head.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The frame payload: everything after the head, or everything if there is none.
    pub fn payload(&self) -> &[u8] {
        if self.headed {
            &self.data[HEADER_SIZE..]
        } else {
            &self.data
        }
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor. Fails if `pos` is past the end.
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(FrameError::Underflow {
                needed: pos,
                available: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Number of unread bytes after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The unread bytes after the cursor.
    pub fn rest(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.data.put_u8(value);
        self
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.data.put_u32(value);
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.data.put_u64(value);
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let [byte] = self.take::<1>()?;
        Ok(byte)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.take::<8>().map(u64::from_be_bytes)
    }

    /// Read `len` bytes from the cursor.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        self.ensure(len)?;
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    /// Replace the contents with `payload` and rewind the cursor.
    pub fn fill_from(&mut self, payload: &[u8]) -> &mut Self {
        self.reset();
        self.data.extend_from_slice(payload);
        self
    }

    /// Patch the reserved head with the payload length and return the
    /// complete frame bytes.
    pub(crate) fn seal(&mut self) -> Result<&[u8]> {
        debug_assert!(self.headed, "seal requires a reserved head");
        let len = checked_len(self.data.len() - HEADER_SIZE)?;
        self.data[..HEADER_SIZE].copy_from_slice(&len.to_be_bytes());
        Ok(&self.data)
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let available = self.remaining();
        if needed > available {
            return Err(FrameError::Underflow { needed, available });
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        let mut buffer = Buffer::with_capacity(bytes.len());
        buffer.write_bytes(bytes);
        buffer
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            data: BytesMut::from(&bytes[..]),
            pos: 0,
            headed: false,
        }
    }
}

impl std::io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
