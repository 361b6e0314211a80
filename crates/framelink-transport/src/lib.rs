//! Duplex stream abstraction for framelink.
//!
//! Provides a unified interface over the byte streams framelink runs on:
//! - TCP sockets
//! - Unix domain sockets (Linux/macOS)
//!
//! This is the lowest layer of framelink. Everything else builds on top of
//! the [`Transport`] trait and the [`NetStream`] type provided here. Bring-up
//! (bind/accept/connect) lives here too, but is deliberately thin: callers
//! that already own a connected stream only need the traits.

pub mod endpoint;
pub mod error;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{connect, Endpoint, Listener};
pub use error::{Result, TransportError};
pub use tcp::TcpTransport;
pub use traits::{NetStream, Timeouts, Transport};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
