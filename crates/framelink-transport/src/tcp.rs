use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::NetStream;

/// TCP listener.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on a TCP address (`host:port`; port 0 picks a free port).
    pub fn bind(addr: &str) -> Result<Self> {
        let bind_err = |source: std::io::Error| TransportError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!(%local_addr, "listening on tcp");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<NetStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted tcp connection");
        Ok(NetStream::from_tcp(stream))
    }

    /// Connect to a listening TCP address (blocking).
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<NetStream> {
        let stream = TcpStream::connect(&addr).map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected over tcp");
        Ok(NetStream::from_tcp(stream))
    }

    /// The bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
