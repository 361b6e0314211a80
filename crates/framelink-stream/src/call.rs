use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

use framelink_frame::{Buffer, BufferPool};
use tracing::{debug, warn};

use crate::error::{Result, RpcError};

/// Outcome delivered to a waiting call: the response buffer for a two-way
/// call, `None` once a one-way frame is written, or the failure.
pub(crate) type Completion = Result<Option<Buffer>>;

/// An outbound request in flight.
///
/// Built by [`Stream::new_call`](crate::Stream::new_call), filled through
/// [`Call::buffer_mut`], submitted with [`Stream::call`](crate::Stream::call)
/// and awaited with [`Call::done`]. After a successful two-way call the
/// buffer holds the response, with the cursor at the application bytes.
///
/// Dropping a call returns whatever buffer it holds to the pool.
pub struct Call {
    seq: Option<u64>,
    buffer: Option<Buffer>,
    completer: Option<Completer>,
    signal: Receiver<Completion>,
    done: bool,
    pool: Arc<dyn BufferPool>,
}

impl Call {
    pub(crate) fn new(seq: Option<u64>, buffer: Buffer, pool: Arc<dyn BufferPool>) -> Self {
        let (tx, signal) = mpsc::sync_channel(1);
        Self {
            seq,
            buffer: Some(buffer),
            completer: Some(Completer {
                tx,
                seq,
                pool: Arc::clone(&pool),
            }),
            signal,
            done: false,
            pool,
        }
    }

    /// Sequence number, `None` for one-way calls.
    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    pub fn is_one_way(&self) -> bool {
        self.seq.is_none()
    }

    /// The request buffer before submission, the response after `done()`.
    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut Buffer> {
        self.buffer.as_mut()
    }

    /// Take ownership of the held buffer. Hand it back with
    /// [`Stream::release`](crate::Stream::release) when finished.
    pub fn take_buffer(&mut self) -> Option<Buffer> {
        self.buffer.take()
    }

    /// Block until the call resolves.
    ///
    /// The outcome can be observed once; later calls return
    /// [`RpcError::AlreadyDone`].
    pub fn done(&mut self) -> Result<()> {
        if self.completer.is_some() {
            return Err(RpcError::NotSubmitted);
        }
        if self.done {
            return Err(RpcError::AlreadyDone);
        }
        self.done = true;

        // A completer dropped without firing means the stream went away.
        match self.signal.recv().unwrap_or(Err(RpcError::Closed)) {
            Ok(response) => {
                self.buffer = response;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Detach the request buffer and the completer for submission.
    pub(crate) fn submit(&mut self) -> Option<(Buffer, Completer)> {
        let completer = self.completer.take()?;
        let Some(buffer) = self.buffer.take() else {
            // Caller took the request buffer before submitting.
            completer.complete(Err(RpcError::Protocol(
                "call submitted without a request buffer".to_string(),
            )));
            return None;
        };
        Some((buffer, completer))
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
        // A completion that arrived but was never observed.
        if let Ok(Ok(Some(buffer))) = self.signal.try_recv() {
            self.pool.release(buffer);
        }
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("seq", &self.seq)
            .field("submitted", &self.completer.is_none())
            .field("done", &self.done)
            .field("buffer_len", &self.buffer.as_ref().map(Buffer::len))
            .finish()
    }
}

/// The resolving side of a [`Call`]; consumed when it fires.
pub(crate) struct Completer {
    tx: SyncSender<Completion>,
    seq: Option<u64>,
    pool: Arc<dyn BufferPool>,
}

impl Completer {
    pub(crate) fn complete(self, outcome: Completion) {
        match self.tx.try_send(outcome) {
            Ok(()) => {}
            Err(TrySendError::Full(outcome)) => {
                warn!(seq = ?self.seq, "call already resolved; dropping completion");
                self.recycle(outcome);
            }
            Err(TrySendError::Disconnected(outcome)) => {
                debug!(seq = ?self.seq, "call abandoned before completion");
                self.recycle(outcome);
            }
        }
    }

    fn recycle(&self, outcome: Completion) {
        if let Ok(Some(buffer)) = outcome {
            self.pool.release(buffer);
        }
    }
}

impl fmt::Debug for Completer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer").field("seq", &self.seq).finish()
    }
}
