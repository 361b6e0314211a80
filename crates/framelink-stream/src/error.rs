use framelink_frame::FrameError;

/// Errors that can occur in stream operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Frame-level error (I/O, timeout, peer close, oversize).
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The peer sent a frame that does not follow the stream protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The write queue was full and the saturation policy rejects.
    #[error("write queue full")]
    QueueFull,

    /// The stream is closed.
    #[error("stream closed")]
    Closed,

    /// The read loop is already running (or has run).
    #[error("read loop already running")]
    AlreadyRunning,

    /// The call's completion was already observed.
    #[error("call already completed")]
    AlreadyDone,

    /// The call was never submitted.
    #[error("call not submitted")]
    NotSubmitted,

    /// The writer thread could not be spawned.
    #[error("failed to spawn writer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl RpcError {
    /// True when the failure may have left a partial frame on the wire, so
    /// the connection can no longer be used.
    pub(crate) fn poisons_connection(&self) -> bool {
        matches!(
            self,
            RpcError::Frame(
                FrameError::Io(_) | FrameError::Timeout(_) | FrameError::ConnectionClosed
            )
        )
    }
}

impl From<framelink_transport::TransportError> for RpcError {
    fn from(err: framelink_transport::TransportError) -> Self {
        RpcError::Frame(err.into())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
