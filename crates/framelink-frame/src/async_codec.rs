//! Async codec for length-prefixed frames using tokio-util.
//!
//! [`LengthPrefixCodec`] speaks the same wire format as [`FrameReader`] and
//! [`FrameWriter`], so an async peer built on `tokio_util::codec::Framed` can
//! talk to a blocking one.
//!
//! Deadlines are not applied here; wrap futures in `tokio::time::timeout`.
//!
//! [`FrameReader`]: crate::FrameReader
//! [`FrameWriter`]: crate::FrameWriter

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, DEFAULT_MAX_FRAME_SIZE};
use crate::error::FrameError;

#[derive(Clone, Debug)]
pub struct LengthPrefixCodec {
    max_frame_size: usize,
}

impl LengthPrefixCodec {
    /// Codec with the default 64 MiB frame limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn check_size(&self, size: usize) -> Result<(), FrameError> {
        if size > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Default for LengthPrefixCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LengthPrefixCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.max_frame_size)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<&[u8]> for LengthPrefixCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.check_size(item.len())?;
        encode_frame(item, dst)
    }
}

impl Encoder<Bytes> for LengthPrefixCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode(item.as_ref(), dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, LengthPrefixCodec::new());
        let mut source = FramedRead::new(server, LengthPrefixCodec::new());

        let writer = tokio::spawn(async move {
            sink.send(Bytes::from_static(b"first")).await.unwrap();
            sink.send(Bytes::from(vec![0x5A; 1000])).await.unwrap();
            sink.send(Bytes::new()).await.unwrap();
        });

        assert_eq!(source.next().await.unwrap().unwrap().as_ref(), b"first");
        assert_eq!(source.next().await.unwrap().unwrap().len(), 1000);
        assert!(source.next().await.unwrap().unwrap().is_empty());
        writer.await.unwrap();
        assert!(source.next().await.is_none());
    }

    #[test]
    fn decode_rejects_oversized_header() {
        let mut codec = LengthPrefixCodec::with_max_frame_size(8);
        let mut src = BytesMut::from(&9u32.to_be_bytes()[..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(FrameError::FrameTooLarge { size: 9, max: 8 })
        ));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let mut codec = LengthPrefixCodec::with_max_frame_size(2);
        let mut dst = BytesMut::new();
        assert!(codec.encode(&b"abc"[..], &mut dst).is_err());
        assert!(dst.is_empty());
    }

    #[test]
    fn truncated_frame_at_eof_is_an_error() {
        let mut codec = LengthPrefixCodec::new();
        let mut src = BytesMut::from(&[0u8, 0, 0, 5, b'h', b'i'][..]);
        assert!(matches!(
            codec.decode_eof(&mut src),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn blocking_writer_output_decodes() {
        let mut writer = crate::FrameWriter::new(Vec::new());
        writer.write_frame(b"sync").unwrap();

        let mut src = BytesMut::from(&writer.into_inner()[..]);
        let frame = LengthPrefixCodec::new().decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"sync");
    }
}
