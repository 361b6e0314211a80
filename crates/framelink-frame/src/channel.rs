//! A framed duplex connection.
//!
//! [`FramedChannel`] pairs a [`FrameReader`] and a [`FrameWriter`] on clones
//! of the same [`Transport`] and keeps a third clone for shutdown. It can be
//! used directly from one thread or split so that one thread reads while
//! another writes. Neither the channel nor its halves hand out the raw
//! transport, so every byte on the wire goes through the framing code.

use std::time::Duration;

use bytes::Bytes;
use framelink_transport::Transport;
use tracing::debug;

use crate::buffer::Buffer;
use crate::codec::FrameConfig;
use crate::error::Result;
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

pub struct FramedChannel<S: Transport> {
    reader: FrameReader<S>,
    writer: FrameWriter<S>,
    closer: ShutdownHandle<S>,
}

/// Handle that can only shut a split channel down.
pub struct ShutdownHandle<S: Transport> {
    stream: S,
}

impl<S: Transport> ShutdownHandle<S> {
    /// Shut the connection down in both directions.
    ///
    /// Any thread blocked reading from a split half wakes up with
    /// `ConnectionClosed`.
    pub fn shutdown(&self) -> Result<()> {
        debug!("shutting down framed channel");
        self.stream.shutdown()?;
        Ok(())
    }
}

impl<S: Transport> FramedChannel<S> {
    /// Frame `stream` using `config` for both directions.
    pub fn new(stream: S, config: FrameConfig) -> Result<Self> {
        let reader = stream.try_clone()?;
        let closer = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::with_config(reader, config.clone()),
            writer: FrameWriter::with_config(stream, config),
            closer: ShutdownHandle { stream: closer },
        })
    }

    pub fn read_frame(&mut self) -> Result<Bytes> {
        self.reader.read_frame()
    }

    pub fn read_frame_into(&mut self, dst: &mut Buffer) -> Result<()> {
        self.reader.read_frame_into(dst)
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.write_frame(payload)
    }

    pub fn write_buffer(&mut self, buffer: &mut Buffer) -> Result<()> {
        self.writer.write_buffer(buffer)
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.reader.set_read_timeout(timeout)
    }

    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.writer.set_write_timeout(timeout)
    }

    /// Shut the connection down in both directions.
    pub fn shutdown(&self) -> Result<()> {
        self.closer.shutdown()
    }

    /// Split into independently owned halves plus a handle for shutdown.
    pub fn into_split(self) -> (FrameReader<S>, FrameWriter<S>, ShutdownHandle<S>) {
        (self.reader, self.writer, self.closer)
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;
    use crate::error::FrameError;

    #[test]
    fn request_reply_over_pair() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut client = FramedChannel::new(left, FrameConfig::default()).unwrap();
        let mut server = FramedChannel::new(right, FrameConfig::default()).unwrap();

        client.write_frame(b"ping").unwrap();
        let got = server.read_frame().unwrap();
        assert_eq!(got.as_ref(), b"ping");

        let mut reply = Buffer::new();
        reply.reset_with_head().write_bytes(b"pong");
        server.write_buffer(&mut reply).unwrap();

        let mut dst = Buffer::new();
        client.read_frame_into(&mut dst).unwrap();
        assert_eq!(dst.rest(), b"pong");
    }

    #[test]
    fn shutdown_wakes_split_reader() {
        let (left, _right) = UnixStream::pair().unwrap();
        let channel = FramedChannel::new(left, FrameConfig::unbounded()).unwrap();
        let (mut reader, _writer, closer) = channel.into_split();

        let blocked = std::thread::spawn(move || reader.read_frame());
        std::thread::sleep(Duration::from_millis(30));
        closer.shutdown().unwrap();

        let result = blocked.join().unwrap();
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn split_halves_run_on_separate_threads() {
        let (left, right) = UnixStream::pair().unwrap();
        let (mut reader, _, _) = FramedChannel::new(left, FrameConfig::default())
            .unwrap()
            .into_split();
        let (_, mut writer, _) = FramedChannel::new(right, FrameConfig::default())
            .unwrap()
            .into_split();

        let sender = std::thread::spawn(move || {
            for i in 0..32u32 {
                writer.write_frame(&i.to_be_bytes()).unwrap();
            }
        });
        for i in 0..32u32 {
            assert_eq!(reader.read_frame().unwrap().as_ref(), &i.to_be_bytes());
        }
        sender.join().unwrap();
    }
}
