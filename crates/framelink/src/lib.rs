//! Length-prefixed framing and multiplexed request/response over sockets.
//!
//! framelink turns a duplex byte stream (TCP or a Unix domain socket) into a
//! connection that many threads can issue calls on at once, with responses
//! matched back to their callers by sequence number.
//!
//! # Crate Structure
//!
//! - [`transport`]: Duplex stream traits, TCP and Unix socket bring-up
//! - [`frame`]: Length-prefixed framing with deadlines and pooled buffers
//! - [`stream`]: Call multiplexing over one connection
//!
//! # Example
//!
//! ```
//! use std::thread;
//!
//! use framelink::transport::{connect, Listener};
//! use framelink::Stream;
//!
//! let listener = Listener::bind(&"127.0.0.1:0".parse()?)?;
//! let client = Stream::new(connect(&listener.local_endpoint())?)?;
//! let server = Stream::new(listener.accept()?)?;
//! server.set_request_handler(|stream, request, response| match response {
//!     Some(mut response) => {
//!         response.write_bytes(request.rest());
//!         stream.reply(request, response);
//!     }
//!     None => stream.release(request),
//! });
//!
//! thread::scope(|s| -> framelink::stream::Result<()> {
//!     s.spawn(|| server.run());
//!     s.spawn(|| client.run());
//!
//!     let response = client.request(b"ping")?;
//!     assert_eq!(response.rest(), b"ping");
//!     client.release(response);
//!
//!     client.close();
//!     server.close();
//!     Ok(())
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use framelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framelink_frame::*;
}

/// Re-export stream types.
pub mod stream {
    pub use framelink_stream::*;
}

pub use framelink_frame::{Buffer, BufferPool, FrameConfig, FrameError};
pub use framelink_stream::{Call, RpcError, SaturationPolicy, Stream, StreamConfig};
pub use framelink_transport::{Endpoint, TransportError};
