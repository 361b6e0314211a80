//! Request/response multiplexing over one framed connection.
//!
//! A [`Stream`] frames its transport with a [`FramedChannel`] and splits it
//! three ways: the read loop ([`Stream::run`]) owns the read half, the write
//! path owns the write half, and a [`ShutdownHandle`] is kept to shut the
//! connection down. Any number of threads may issue calls
//! concurrently; responses are matched back to their callers by sequence
//! number, in whatever order the peer sends them.
//!
//! # Example
//!
//! ```no_run
//! use std::os::unix::net::UnixStream;
//! use framelink_stream::Stream;
//!
//! # fn main() -> framelink_stream::Result<()> {
//! let (left, right) = UnixStream::pair().expect("socket pair");
//! let server = Stream::new(right)?;
//! server.set_request_handler(|stream, request, response| {
//!     if let Some(mut response) = response {
//!         response.write_bytes(request.rest());
//!         stream.reply(request, response);
//!     } else {
//!         stream.release(request);
//!     }
//! });
//! let client = Stream::new(left)?;
//!
//! std::thread::scope(|s| {
//!     s.spawn(|| server.run());
//!     s.spawn(|| client.run());
//!
//!     let response = client.request(b"ping")?;
//!     assert_eq!(response.rest(), b"ping");
//!     client.release(response);
//!     client.close();
//!     server.close();
//!     Ok(())
//! })
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use framelink_frame::{
    Buffer, BufferPool, FrameReader, FrameWriter, FramedChannel, ShutdownHandle,
};
use framelink_transport::Transport;
use tracing::{debug, info, trace, warn};

use crate::call::{Call, Completer};
use crate::config::{SaturationPolicy, StreamConfig};
use crate::error::{Result, RpcError};
use crate::header::{Header, MessageKind};
use crate::registry::CallRegistry;
use crate::writer::{InputError, SerializedWriter};

const WRITER_THREAD_NAME: &str = "framelink-writer";

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a [`Stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, read loop not started.
    Idle,
    /// Read loop running.
    Running,
    /// Terminal.
    Closed,
}

/// Handler for inbound requests.
///
/// Receives the request buffer with its cursor at the application bytes, and
/// for two-way requests a response buffer already carrying the response
/// header. Both must end up back at the stream: the response via
/// [`Stream::reply`], anything unused via [`Stream::release`].
pub type RequestHandler<S> = Arc<dyn Fn(&Stream<S>, Buffer, Option<Buffer>) + Send + Sync>;

/// Hook invoked when an outbound frame cannot be sent.
///
/// Runs on whichever thread performed the write (the caller's, or the writer
/// thread when a write queue is configured), so it must not block.
pub type WriteErrorHandler = Arc<dyn Fn(&RpcError) + Send + Sync>;

/// A multiplexed request/response connection. Cloning is cheap.
pub struct Stream<S: Transport> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: Transport> {
    shared: Arc<Shared<S>>,
    write_path: WritePath<S>,
    reader: Mutex<Option<FrameReader<S>>>,
    handler: RwLock<Option<RequestHandler<S>>>,
    next_seq: AtomicU64,
    saturation: SaturationPolicy,
    close_requested: AtomicBool,
}

/// State reachable from both the stream handles and the writer thread.
struct Shared<S: Transport> {
    registry: CallRegistry<Completer>,
    pool: Arc<dyn BufferPool>,
    state: AtomicU8,
    closer: Mutex<ShutdownHandle<S>>,
    write_error_handler: RwLock<Option<WriteErrorHandler>>,
}

enum WritePath<S: Transport> {
    Direct(Mutex<FrameWriter<S>>),
    Queued(SerializedWriter<Outbound>),
}

struct Outbound {
    buffer: Buffer,
    target: Target,
}

/// Who hears about the outcome of an outbound frame.
enum Target {
    /// Two-way call: only a failure is reported here, success waits for the response.
    Call(u64),
    OneWay(Completer),
    Reply,
}

impl<S: Transport> Stream<S> {
    /// Wrap `transport` with the default configuration.
    pub fn new(transport: S) -> Result<Self> {
        Self::with_config(transport, StreamConfig::default())
    }

    pub fn with_config(transport: S, config: StreamConfig) -> Result<Self> {
        let (reader, mut writer, closer) =
            FramedChannel::new(transport, config.frame)?.into_split();

        let shared = Arc::new(Shared {
            registry: CallRegistry::new(),
            pool: config.pool,
            state: AtomicU8::new(IDLE),
            closer: Mutex::new(closer),
            write_error_handler: RwLock::new(None),
        });

        let write_path = match config.write_queue_capacity {
            None => WritePath::Direct(Mutex::new(writer)),
            Some(capacity) => {
                let worker_shared = Arc::clone(&shared);
                let queue =
                    SerializedWriter::start(WRITER_THREAD_NAME, capacity, move |out: Outbound| {
                        worker_shared.write_outbound(&mut writer, out);
                    })
                    .map_err(RpcError::Spawn)?;
                WritePath::Queued(queue)
            }
        };

        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                write_path,
                reader: Mutex::new(Some(reader)),
                handler: RwLock::new(None),
                next_seq: AtomicU64::new(1),
                saturation: config.saturation,
                close_requested: AtomicBool::new(false),
            }),
        })
    }

    /// Install the handler invoked for every inbound request.
    pub fn set_request_handler<F>(&self, handler: F)
    where
        F: Fn(&Stream<S>, Buffer, Option<Buffer>) + Send + Sync + 'static,
    {
        *self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Install a hook that observes every failed outbound write.
    ///
    /// Call and one-way failures also reach their caller through
    /// [`Call::done`]; a reply has no caller, so this hook is the only place
    /// its failure surfaces. Writes skipped because the stream is already
    /// closed are not reported.
    pub fn set_write_error_handler<F>(&self, handler: F)
    where
        F: Fn(&RpcError) + Send + Sync + 'static,
    {
        *self
            .inner
            .shared
            .write_error_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Prepare a call. Append the application payload through
    /// [`Call::buffer_mut`] before submitting it with [`Stream::call`].
    pub fn new_call(&self, one_way: bool) -> Call {
        let pool = &self.inner.shared.pool;
        let mut buffer = pool.acquire();
        buffer.reset_with_head();

        let seq = if one_way {
            Header::new(MessageKind::OneWayRequest, 0).write_to(&mut buffer);
            None
        } else {
            let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
            Header::new(MessageKind::Request, seq).write_to(&mut buffer);
            Some(seq)
        };

        Call::new(seq, buffer, Arc::clone(pool))
    }

    /// Submit `call`. Its outcome, including a send failure, is observed
    /// through [`Call::done`].
    pub fn call(&self, call: &mut Call) {
        let Some((buffer, completer)) = call.submit() else {
            warn!(seq = ?call.seq(), "call cannot be submitted again");
            return;
        };
        let shared = &self.inner.shared;

        if shared.is_closed() {
            shared.pool.release(buffer);
            completer.complete(Err(RpcError::Closed));
            return;
        }

        let target = match call.seq() {
            None => Target::OneWay(completer),
            Some(seq) => {
                if let Some(displaced) = shared.registry.store(seq, completer) {
                    warn!(seq, "sequence number already pending; displacing older call");
                    displaced.complete(Err(RpcError::Protocol(format!(
                        "call {seq} displaced by a newer call with the same sequence number"
                    ))));
                }
                // A close that raced the store may have drained before it.
                if shared.is_closed() {
                    if let Some(completer) = shared.registry.claim_and_delete(seq) {
                        completer.complete(Err(RpcError::Closed));
                    }
                    shared.pool.release(buffer);
                    return;
                }
                Target::Call(seq)
            }
        };

        trace!(seq = ?call.seq(), "submitting call");
        self.submit(Outbound { buffer, target });
    }

    /// Send a response prepared by the request handler and recycle the request.
    pub fn reply(&self, request: Buffer, response: Buffer) {
        let shared = &self.inner.shared;
        shared.pool.release(request);
        if shared.is_closed() {
            debug!("stream closed; dropping reply");
            shared.pool.release(response);
            return;
        }
        self.submit(Outbound {
            buffer: response,
            target: Target::Reply,
        });
    }

    /// Two-way call carrying `payload`. Returns the response buffer with its
    /// cursor at the application bytes; hand it back with [`Stream::release`].
    pub fn request(&self, payload: &[u8]) -> Result<Buffer> {
        let mut call = self.new_call(false);
        if let Some(buffer) = call.buffer_mut() {
            buffer.write_bytes(payload);
        }
        self.call(&mut call);
        call.done()?;
        call.take_buffer()
            .ok_or_else(|| RpcError::Protocol("response carried no payload".to_string()))
    }

    /// One-way call carrying `payload`. Returns once the frame is written.
    pub fn notify(&self, payload: &[u8]) -> Result<()> {
        let mut call = self.new_call(true);
        if let Some(buffer) = call.buffer_mut() {
            buffer.write_bytes(payload);
        }
        self.call(&mut call);
        call.done()
    }

    /// Return a buffer to the pool.
    pub fn release(&self, buffer: Buffer) {
        self.inner.shared.pool.release(buffer);
    }

    /// Number of two-way calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.shared.registry.len()
    }

    pub fn state(&self) -> StreamState {
        self.inner.shared.state()
    }

    /// Drive the read loop on the calling thread until the stream closes.
    ///
    /// Returns `Ok(())` when ended by [`Stream::close`], otherwise the error
    /// that ended it. Either way the stream is closed on return.
    pub fn run(&self) -> Result<()> {
        let shared = &self.inner.shared;
        let mut reader = {
            let mut slot = self
                .inner
                .reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if shared.is_closed() {
                return Err(RpcError::Closed);
            }
            slot.take().ok_or(RpcError::AlreadyRunning)?
        };
        if shared
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RpcError::Closed);
        }
        debug!("stream read loop started");

        let err = loop {
            let mut buffer = shared.pool.acquire();
            if let Err(err) = reader.read_frame_into(&mut buffer) {
                shared.pool.release(buffer);
                break err;
            }
            self.dispatch(buffer);
        };

        let requested = self.inner.close_requested.load(Ordering::SeqCst);
        self.inner.shutdown();

        if requested {
            debug!("stream read loop stopped by close");
            return Ok(());
        }
        if err.is_protocol_violation() {
            warn!(error = %err, "peer violated framing; stream closed");
        } else {
            info!(error = %err, "stream read loop ended");
        }
        Err(err.into())
    }

    /// Close the stream: shut the transport down, resolve every pending call
    /// with [`RpcError::Closed`] and stop the writer. Idempotent.
    pub fn close(&self) {
        self.inner.close_requested.store(true, Ordering::SeqCst);
        self.inner.shutdown();
    }

    fn dispatch(&self, mut buffer: Buffer) {
        let shared = &self.inner.shared;
        let header = match Header::read_from(&mut buffer) {
            Ok(header) => header,
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                shared.pool.release(buffer);
                return;
            }
        };

        match header.kind {
            MessageKind::Response => match shared.registry.claim_and_delete(header.seq) {
                Some(completer) => {
                    trace!(seq = header.seq, "response matched");
                    completer.complete(Ok(Some(buffer)));
                }
                None => {
                    warn!(seq = header.seq, "response for unknown call; discarding");
                    shared.pool.release(buffer);
                }
            },
            MessageKind::Request => {
                let mut response = shared.pool.acquire();
                response.reset_with_head();
                Header::new(MessageKind::Response, header.seq).write_to(&mut response);
                self.handle_request(buffer, Some(response));
            }
            MessageKind::OneWayRequest => self.handle_request(buffer, None),
        }
    }

    fn handle_request(&self, request: Buffer, response: Option<Buffer>) {
        let handler = self
            .inner
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => handler(self, request, response),
            None => {
                warn!("no request handler installed; dropping request");
                self.release(request);
                if let Some(response) = response {
                    self.release(response);
                }
            }
        }
    }

    fn submit(&self, out: Outbound) {
        let shared = &self.inner.shared;
        match &self.inner.write_path {
            WritePath::Direct(writer) => {
                let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                shared.write_outbound(&mut writer, out);
            }
            WritePath::Queued(queue) => {
                let rejected = match self.inner.saturation {
                    SaturationPolicy::Block => queue
                        .must_input(out)
                        .err()
                        .map(|out| (out, RpcError::Closed)),
                    SaturationPolicy::Reject => match queue.input(out) {
                        Ok(()) => None,
                        Err(InputError::Full(out)) => Some((out, RpcError::QueueFull)),
                        Err(InputError::Stopped(out)) => Some((out, RpcError::Closed)),
                    },
                };
                if let Some((out, err)) = rejected {
                    shared.pool.release(out.buffer);
                    shared.settle(out.target, Err(err));
                }
            }
        }
    }
}

impl<S: Transport> Inner<S> {
    fn shutdown(&self) {
        self.shared.close();
        if let WritePath::Queued(queue) = &self.write_path {
            queue.stop();
        }
    }
}

impl<S: Transport> Drop for Inner<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: Transport> Shared<S> {
    fn state(&self) -> StreamState {
        match self.state.load(Ordering::SeqCst) {
            IDLE => StreamState::Idle,
            RUNNING => StreamState::Running,
            _ => StreamState::Closed,
        }
    }

    fn is_closed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CLOSED
    }

    /// Transition to closed. Only the first caller does the work.
    fn close(&self) -> bool {
        if self.state.swap(CLOSED, Ordering::SeqCst) == CLOSED {
            return false;
        }

        let closer = self.closer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = closer.shutdown() {
            debug!(error = %err, "transport shutdown failed");
        }
        drop(closer);

        let pending = self.registry.drain();
        if !pending.is_empty() {
            debug!(count = pending.len(), "resolving pending calls as closed");
        }
        for (_, completer) in pending {
            completer.complete(Err(RpcError::Closed));
        }
        debug!("stream closed");
        true
    }

    fn write_outbound(&self, writer: &mut FrameWriter<S>, out: Outbound) {
        let Outbound { mut buffer, target } = out;
        let result = if self.is_closed() {
            Err(RpcError::Closed)
        } else {
            writer.write_buffer(&mut buffer).map_err(RpcError::from)
        };
        self.pool.release(buffer);

        let poisoned = matches!(&result, Err(err) if err.poisons_connection());
        if let Err(err) = &result {
            if poisoned {
                warn!(error = %err, "write failed; closing stream");
            }
        }
        self.settle(target, result);
        if poisoned {
            self.close();
        }
    }

    fn settle(&self, target: Target, result: Result<()>) {
        if let Err(err) = &result {
            self.report_write_error(err);
        }
        match target {
            Target::OneWay(completer) => completer.complete(result.map(|()| None)),
            Target::Call(seq) => {
                if let Err(err) = result {
                    if let Some(completer) = self.registry.claim_and_delete(seq) {
                        completer.complete(Err(err));
                    }
                }
            }
            Target::Reply => match result {
                Ok(()) => {}
                Err(RpcError::Closed) => debug!("stream closed; reply not sent"),
                Err(err) => warn!(error = %err, "reply not sent"),
            },
        }
    }

    fn report_write_error(&self, err: &RpcError) {
        if matches!(err, RpcError::Closed) {
            return;
        }
        let handler = self
            .write_error_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }
}

impl<S: Transport> Clone for Stream<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Transport> fmt::Debug for Stream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("state", &self.state())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use framelink_frame::{FrameConfig, FrameError};

    use super::*;

    fn echo_server(stream: &Stream<UnixStream>) {
        stream.set_request_handler(|stream, request, response| match response {
            Some(mut response) => {
                response.write_bytes(request.rest());
                stream.reply(request, response);
            }
            None => stream.release(request),
        });
    }

    #[test]
    fn echo_single_byte() {
        let (left, right) = UnixStream::pair().unwrap();
        let server = Stream::new(right).unwrap();
        echo_server(&server);
        let client = Stream::new(left).unwrap();

        std::thread::scope(|s| {
            let server_loop = s.spawn(|| server.run());
            let client_loop = s.spawn(|| client.run());

            let mut call = client.new_call(false);
            call.buffer_mut().unwrap().write_u8(0x01);
            client.call(&mut call);
            call.done().unwrap();
            assert_eq!(call.buffer().unwrap().rest(), &[0x01]);
            drop(call);

            client.close();
            server.close();
            client_loop.join().unwrap().unwrap();
            server_loop.join().unwrap().unwrap();
        });
    }

    #[test]
    fn state_transitions() {
        let (left, _right) = UnixStream::pair().unwrap();
        let stream = Stream::new(left).unwrap();
        assert_eq!(stream.state(), StreamState::Idle);

        std::thread::scope(|s| {
            let loop_handle = s.spawn(|| stream.run());
            while stream.state() == StreamState::Idle {
                std::thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(stream.state(), StreamState::Running);
            assert!(matches!(stream.run(), Err(RpcError::AlreadyRunning)));

            stream.close();
            loop_handle.join().unwrap().unwrap();
        });

        assert_eq!(stream.state(), StreamState::Closed);
        assert!(matches!(stream.run(), Err(RpcError::Closed)));
    }

    #[test]
    fn call_on_closed_stream_resolves_closed() {
        let (left, _right) = UnixStream::pair().unwrap();
        let stream = Stream::new(left).unwrap();
        stream.close();

        let mut call = stream.new_call(false);
        stream.call(&mut call);
        assert!(matches!(call.done(), Err(RpcError::Closed)));
        assert_eq!(stream.pending_calls(), 0);
    }

    #[test]
    fn close_resolves_pending_calls() {
        let (left, _right) = UnixStream::pair().unwrap();
        let stream = Stream::new(left).unwrap();

        let mut calls: Vec<Call> = (0..3).map(|_| stream.new_call(false)).collect();
        for call in &mut calls {
            stream.call(call);
        }
        assert_eq!(stream.pending_calls(), 3);

        stream.close();
        for call in &mut calls {
            assert!(matches!(call.done(), Err(RpcError::Closed)));
        }
        assert_eq!(stream.pending_calls(), 0);
    }

    #[test]
    fn sequence_numbers_increase_from_one() {
        let (left, _right) = UnixStream::pair().unwrap();
        let stream = Stream::new(left).unwrap();

        let first = stream.new_call(false);
        let second = stream.new_call(false);
        let one_way = stream.new_call(true);
        assert_eq!(first.seq(), Some(1));
        assert_eq!(second.seq(), Some(2));
        assert_eq!(one_way.seq(), None);
        assert_eq!(one_way.buffer().unwrap().payload(), &[0x03]);
    }

    #[test]
    fn one_way_never_registers() {
        let (left, right) = UnixStream::pair().unwrap();
        let stream = Stream::new(left).unwrap();
        let mut peer = FramedChannel::new(right, FrameConfig::default()).unwrap();

        stream.notify(b"fire").unwrap();
        assert_eq!(stream.pending_calls(), 0);

        let frame = peer.read_frame().unwrap();
        assert_eq!(frame.as_ref(), b"\x03fire");
    }

    #[test]
    fn malformed_and_unknown_frames_are_dropped() {
        let (left, right) = UnixStream::pair().unwrap();
        let stream = Stream::new(left).unwrap();
        echo_server(&stream);
        let mut peer = FramedChannel::new(right, FrameConfig::default()).unwrap();

        std::thread::scope(|s| {
            let loop_handle = s.spawn(|| stream.run());

            // Reserved bit, one-way response, truncated seq, unknown seq.
            peer.write_frame(&[0x05]).unwrap();
            peer.write_frame(&[0x02]).unwrap();
            peer.write_frame(&[0x01, 0x00]).unwrap();
            let mut unknown = vec![0x00];
            unknown.extend_from_slice(&42u64.to_be_bytes());
            peer.write_frame(&unknown).unwrap();

            // The loop keeps serving afterwards.
            let mut request = vec![0x01];
            request.extend_from_slice(&9u64.to_be_bytes());
            request.extend_from_slice(b"still alive");
            peer.write_frame(&request).unwrap();

            let reply = peer.read_frame().unwrap();
            assert_eq!(reply[0], 0x00);
            assert_eq!(&reply[1..9], &9u64.to_be_bytes());
            assert_eq!(&reply[9..], b"still alive");

            stream.close();
            loop_handle.join().unwrap().unwrap();
        });
    }

    #[test]
    fn oversized_inbound_frame_ends_read_loop() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let config = StreamConfig::default().with_frame(FrameConfig {
            max_frame_size: 16,
            ..FrameConfig::default()
        });
        let stream = Stream::with_config(left, config).unwrap();
        let mut pending = stream.new_call(false);
        stream.call(&mut pending);

        std::io::Write::write_all(&mut right, &1024u32.to_be_bytes()).unwrap();
        let err = stream.run().unwrap_err();
        assert!(matches!(
            err,
            RpcError::Frame(FrameError::FrameTooLarge { size: 1024, max: 16 })
        ));
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(matches!(pending.done(), Err(RpcError::Closed)));
    }

    #[test]
    fn oversized_outbound_fails_only_that_call() {
        let (left, right) = UnixStream::pair().unwrap();
        let config = StreamConfig::default().with_frame(FrameConfig {
            max_frame_size: 32,
            ..FrameConfig::default()
        });
        let stream = Stream::with_config(left, config).unwrap();
        let mut peer = FramedChannel::new(right, FrameConfig::default()).unwrap();

        let mut big = stream.new_call(false);
        big.buffer_mut().unwrap().write_bytes(&[0u8; 64]);
        stream.call(&mut big);
        assert!(matches!(
            big.done(),
            Err(RpcError::Frame(FrameError::FrameTooLarge { .. }))
        ));
        assert_eq!(stream.pending_calls(), 0);
        assert_ne!(stream.state(), StreamState::Closed);

        stream.notify(b"small").unwrap();
        assert_eq!(peer.read_frame().unwrap().as_ref(), b"\x03small");
    }

    #[test]
    fn missing_handler_drops_request() {
        let (left, right) = UnixStream::pair().unwrap();
        let stream = Stream::new(left).unwrap();
        let mut peer = FramedChannel::new(right, FrameConfig::default()).unwrap();

        std::thread::scope(|s| {
            let loop_handle = s.spawn(|| stream.run());
            let mut request = vec![0x01];
            request.extend_from_slice(&1u64.to_be_bytes());
            peer.write_frame(&request).unwrap();

            peer.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
            assert!(peer.read_frame().unwrap_err().is_timeout());

            stream.close();
            loop_handle.join().unwrap().unwrap();
        });
    }

    #[test]
    fn peer_close_ends_loop_with_error() {
        let (left, right) = UnixStream::pair().unwrap();
        let stream = Stream::new(left).unwrap();
        drop(right);
        assert!(matches!(
            stream.run(),
            Err(RpcError::Frame(FrameError::ConnectionClosed))
        ));
    }

    #[test]
    fn close_shuts_the_transport_down() {
        let (left, right) = UnixStream::pair().unwrap();
        let stream = Stream::new(left).unwrap();
        let mut peer = FramedChannel::new(right, FrameConfig::default()).unwrap();

        stream.close();
        assert!(matches!(
            peer.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn duplicate_sequence_displaces_older_call() {
        let (left, _left_peer) = UnixStream::pair().unwrap();
        let (right, _right_peer) = UnixStream::pair().unwrap();
        let other = Stream::new(left).unwrap();
        let stream = Stream::new(right).unwrap();

        // Both streams hand out seq 1 first.
        let mut older = other.new_call(false);
        let mut newer = stream.new_call(false);
        assert_eq!(older.seq(), newer.seq());

        stream.call(&mut older);
        stream.call(&mut newer);
        assert!(matches!(older.done(), Err(RpcError::Protocol(_))));
        assert_eq!(stream.pending_calls(), 1);

        stream.close();
        assert!(matches!(newer.done(), Err(RpcError::Closed)));
    }

    #[test]
    fn rejected_reply_reaches_write_error_handler() {
        let (left, right) = UnixStream::pair().unwrap();
        let config = StreamConfig::default()
            .with_frame(FrameConfig::unbounded())
            .with_write_queue(1, SaturationPolicy::Reject);
        let server = Stream::with_config(right, config).unwrap();
        echo_server(&server);

        let rejected = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&rejected);
        server.set_write_error_handler(move |err| {
            if matches!(err, RpcError::QueueFull) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // The client never reads, so replies back up behind a full socket.
        let mut client = FramedChannel::new(left, FrameConfig::unbounded()).unwrap();
        let payload = vec![0xA5u8; 256 * 1024];

        std::thread::scope(|s| {
            let server_loop = s.spawn(|| server.run());

            for seq in 1..=32u64 {
                let mut request = vec![0x01];
                request.extend_from_slice(&seq.to_be_bytes());
                request.extend_from_slice(&payload);
                client.write_frame(&request).unwrap();
            }

            let deadline = Instant::now() + Duration::from_secs(5);
            while rejected.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            assert!(rejected.load(Ordering::SeqCst) > 0);

            server.close();
            server_loop.join().unwrap().unwrap();
        });
    }

    #[test]
    fn write_error_handler_sees_oversized_one_way() {
        let (left, _right) = UnixStream::pair().unwrap();
        let config = StreamConfig::default().with_frame(FrameConfig {
            max_frame_size: 8,
            ..FrameConfig::default()
        });
        let stream = Stream::with_config(left, config).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        stream.set_write_error_handler(move |err| {
            assert!(matches!(err, RpcError::Frame(FrameError::FrameTooLarge { .. })));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(stream.notify(&[0u8; 32]).is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // Closed-stream skips are not write failures.
        stream.close();
        assert!(matches!(stream.notify(b"x"), Err(RpcError::Closed)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
