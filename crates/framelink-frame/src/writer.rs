use std::io::{ErrorKind, Write};
use std::time::Duration;

use bytes::BytesMut;
use framelink_transport::Timeouts;
use tracing::trace;

use crate::buffer::Buffer;
use crate::codec::{encode_frame, FrameConfig};
use crate::deadline::{is_timeout_kind, Deadline};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to a stream.
///
/// Each frame is written in full under one deadline; the header and payload
/// go out as a single contiguous write sequence so concurrent writers on the
/// same connection must be serialized by the caller.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write + Timeouts> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write one frame carrying `payload` (blocking).
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.check_size(payload.len())?;

        self.buf.clear();
        encode_frame(payload, &mut self.buf)?;

        let mut buf = std::mem::take(&mut self.buf);
        let result = self.write_all_within_deadline(&buf);
        buf.clear();
        self.buf = buf;
        result
    }

    /// Write a buffer built with a reserved head, without copying the payload.
    ///
    /// The head is patched with the payload length in place. Buffers without
    /// a head are framed through [`FrameWriter::write_frame`] instead.
    pub fn write_buffer(&mut self, buffer: &mut Buffer) -> Result<()> {
        if !buffer.has_head() {
            return self.write_frame(buffer.as_bytes());
        }

        self.check_size(buffer.payload().len())?;
        let frame = buffer.seal()?;
        self.write_all_within_deadline(frame)
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.config.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.config.max_frame_size,
            });
        }
        Ok(())
    }

    fn write_all_within_deadline(&mut self, frame: &[u8]) -> Result<()> {
        let deadline = Deadline::start(self.config.write_timeout);

        let mut offset = 0usize;
        while offset < frame.len() {
            if let Some(left) = deadline.remaining()? {
                self.inner.set_write_timeout(Some(left))?;
            }

            match self.inner.write(&frame[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if deadline.is_armed() && is_timeout_kind(err.kind()) => {
                    return Err(deadline.expired());
                }
                // Unarmed, WouldBlock means a non-blocking socket; retrying would spin.
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        trace!(size = frame.len(), "frame written");
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn get_ref(&self) -> &T {
        &self.inner
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent writes.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Update the per-frame write deadline.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        if timeout.is_none() {
            self.inner.set_write_timeout(None)?;
        }
        self.config.write_timeout = timeout;
        Ok(())
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::os::unix::net::UnixStream;

    use super::*;
    use crate::codec::{decode_frame, DEFAULT_MAX_FRAME_SIZE};

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(b"hello").unwrap();

        let written = writer.into_inner();
        assert_eq!(&written[..4], &5u32.to_be_bytes());
        assert_eq!(&written[4..], b"hello");
    }

    #[test]
    fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(b"first").unwrap();
        writer.write_frame(b"").unwrap();
        writer.write_frame(b"third").unwrap();

        let mut wire = BytesMut::from(&writer.into_inner()[..]);
        for expected in [&b"first"[..], b"", b"third"] {
            let frame = decode_frame(&mut wire, DEFAULT_MAX_FRAME_SIZE)
                .unwrap()
                .unwrap();
            assert_eq!(frame.as_ref(), expected);
        }
        assert!(wire.is_empty());
    }

    #[test]
    fn oversized_payload_rejected_before_any_write() {
        let cfg = FrameConfig {
            max_frame_size: 4,
            ..FrameConfig::unbounded()
        };
        let mut writer = FrameWriter::with_config(Vec::new(), cfg);

        let result = writer.write_frame(b"too long");
        assert!(matches!(
            result,
            Err(FrameError::FrameTooLarge { size: 8, max: 4 })
        ));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn write_buffer_patches_head_in_place() {
        let mut writer = FrameWriter::new(Vec::new());
        let mut buffer = Buffer::new();
        buffer.reset_with_head().write_u8(0x01).write_u64(9);

        writer.write_buffer(&mut buffer).unwrap();

        let written = writer.into_inner();
        assert_eq!(&written[..4], &9u32.to_be_bytes());
        assert_eq!(written[4], 0x01);
        assert_eq!(&written[5..], &9u64.to_be_bytes());
    }

    #[test]
    fn write_buffer_without_head_is_framed() {
        let mut writer = FrameWriter::new(Vec::new());
        let mut buffer = Buffer::from(&b"raw"[..]);

        writer.write_buffer(&mut buffer).unwrap();
        assert_eq!(writer.into_inner(), b"\x00\x00\x00\x03raw");
    }

    #[test]
    fn write_buffer_respects_max_frame_size() {
        let cfg = FrameConfig {
            max_frame_size: 2,
            ..FrameConfig::unbounded()
        };
        let mut writer = FrameWriter::with_config(Vec::new(), cfg);
        let mut buffer = Buffer::new();
        buffer.reset_with_head().write_bytes(b"abc");

        assert!(matches!(
            writer.write_buffer(&mut buffer),
            Err(FrameError::FrameTooLarge { size: 3, max: 2 })
        ));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn flush_called_after_each_frame() {
        let mut writer = FrameWriter::new(FlushTrackingWriter::default());
        writer.write_frame(b"a").unwrap();
        writer.write_frame(b"b").unwrap();
        assert_eq!(writer.get_ref().flushes, 2);
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let mut writer = FrameWriter::new(ScriptedWriter::new(ErrorKind::Interrupted));
        writer.write_frame(b"retry").unwrap();

        let inner = writer.into_inner();
        assert_eq!(&inner.written[4..], b"retry");
        assert!(inner.flushed);
    }

    #[test]
    fn would_block_without_deadline_is_io() {
        let cfg = FrameConfig::unbounded();
        let mut writer =
            FrameWriter::with_config(ScriptedWriter::new(ErrorKind::WouldBlock), cfg);
        let err = writer.write_frame(b"spin").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
        assert!(writer.get_ref().written.is_empty());
    }

    #[test]
    fn would_block_flush_without_deadline_is_io() {
        let mut writer = FrameWriter::new(ScriptedWriter {
            failed_write: true,
            ..ScriptedWriter::new(ErrorKind::WouldBlock)
        });
        writer.set_write_timeout(None).unwrap();
        let err = writer.write_frame(b"body").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
        assert!(!writer.get_ref().flushed);
    }

    #[test]
    fn would_block_under_deadline_is_timeout() {
        let mut writer = FrameWriter::new(ScriptedWriter::new(ErrorKind::WouldBlock));
        let err = writer.write_frame(b"late").unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        assert!(matches!(
            writer.write_frame(b"x"),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn broken_pipe_surfaces_as_io() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(right);
        let mut writer = FrameWriter::new(left);

        // The first write may land in the socket buffer; keep going until
        // the kernel reports the closed peer.
        let err = (0..64)
            .find_map(|_| writer.write_frame(&[0u8; 1024]).err())
            .expect("peer is gone");
        assert!(matches!(err, FrameError::Io(_)));
    }

    #[test]
    fn write_deadline_fires_when_peer_stops_reading() {
        let (left, _right) = UnixStream::pair().unwrap();
        let cfg = FrameConfig {
            write_timeout: Some(Duration::from_millis(50)),
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(left, cfg);

        let payload = vec![0u8; 1024 * 1024];
        let err = (0..64)
            .find_map(|_| writer.write_frame(&payload).err())
            .expect("socket buffer fills up");
        assert!(matches!(err, FrameError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[test]
    fn accessors_and_setters() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.set_max_frame_size(128);
        writer.set_write_timeout(None).unwrap();
        assert_eq!(writer.config().max_frame_size, 128);
        assert!(writer.config().write_timeout.is_none());
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushes: usize,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    impl Timeouts for FlushTrackingWriter {
        fn set_read_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
            Ok(())
        }

        fn set_write_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Fails the first write and the first flush with `kind`.
    struct ScriptedWriter {
        kind: ErrorKind,
        failed_write: bool,
        failed_flush: bool,
        written: Vec<u8>,
        flushed: bool,
    }

    impl ScriptedWriter {
        fn new(kind: ErrorKind) -> Self {
            Self {
                kind,
                failed_write: false,
                failed_flush: false,
                written: Vec::new(),
                flushed: false,
            }
        }
    }

    impl Write for ScriptedWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.failed_write {
                self.failed_write = true;
                return Err(std::io::Error::from(self.kind));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.failed_flush {
                self.failed_flush = true;
                return Err(std::io::Error::from(self.kind));
            }
            self.flushed = true;
            Ok(())
        }
    }

    impl Timeouts for ScriptedWriter {
        fn set_read_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
            Ok(())
        }

        fn set_write_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Timeouts for ZeroWriter {
        fn set_read_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
            Ok(())
        }

        fn set_write_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
            Ok(())
        }
    }
}
