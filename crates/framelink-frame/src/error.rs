use std::time::Duration;

/// Errors that can occur while framing a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared (or requested) frame length exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation did not finish before its deadline.
    #[error("frame I/O timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// A cursor read ran past the end of a buffer.
    #[error("buffer underflow (need {needed} bytes, {available} available)")]
    Underflow { needed: usize, available: usize },
}

impl FrameError {
    /// True when the stream position can no longer be trusted.
    ///
    /// An oversized declared length means the payload was never consumed, so
    /// the only safe reaction is to close the connection.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, FrameError::FrameTooLarge { .. })
    }

    /// True for deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FrameError::Timeout(_))
    }
}

impl From<framelink_transport::TransportError> for FrameError {
    fn from(err: framelink_transport::TransportError) -> Self {
        match err {
            framelink_transport::TransportError::Io(io)
            | framelink_transport::TransportError::Accept(io) => FrameError::Io(io),
            framelink_transport::TransportError::Bind { source, .. }
            | framelink_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
