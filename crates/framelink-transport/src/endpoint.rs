use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};
use crate::tcp::TcpTransport;
use crate::traits::NetStream;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// Where to listen or connect.
///
/// Accepted spellings:
/// - `tcp://host:port`
/// - `unix:///path/to.sock`
/// - a bare `host:port` (TCP) or a bare path containing `/` (Unix)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("endpoint must not be empty"));
        }

        if let Some(addr) = trimmed.strip_prefix("tcp://") {
            return parse_tcp(addr).ok_or_else(|| invalid("expected tcp://host:port"));
        }
        if let Some(path) = trimmed.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("unix endpoint needs a path"));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if trimmed.contains("://") {
            return Err(invalid("unsupported scheme (use tcp:// or unix://)"));
        }
        if trimmed.contains('/') {
            return Ok(Endpoint::Unix(PathBuf::from(trimmed)));
        }
        parse_tcp(trimmed).ok_or_else(|| invalid("expected host:port or a socket path"))
    }
}

fn parse_tcp(addr: &str) -> Option<Endpoint> {
    let (host, port) = addr.rsplit_once(':')?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }
    Some(Endpoint::Tcp(addr.to_string()))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// A bound listener for either endpoint kind.
pub enum Listener {
    Tcp(TcpTransport),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

impl Listener {
    /// Bind a listener for `endpoint`.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => Ok(Listener::Tcp(TcpTransport::bind(addr)?)),
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Listener::Unix(UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(path) => Err(unsupported_unix(path)),
        }
    }

    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<NetStream> {
        match self {
            Listener::Tcp(listener) => listener.accept(),
            #[cfg(unix)]
            Listener::Unix(listener) => listener.accept(),
        }
    }

    /// The endpoint peers should connect to (resolves TCP port 0).
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            Listener::Tcp(listener) => Endpoint::Tcp(listener.local_addr().to_string()),
            #[cfg(unix)]
            Listener::Unix(listener) => Endpoint::Unix(listener.path().to_path_buf()),
        }
    }
}

/// Connect to `endpoint` (blocking).
pub fn connect(endpoint: &Endpoint) -> Result<NetStream> {
    match endpoint {
        Endpoint::Tcp(addr) => TcpTransport::connect(addr.as_str()),
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path),
        #[cfg(not(unix))]
        Endpoint::Unix(path) => Err(unsupported_unix(path)),
    }
}

#[cfg(not(unix))]
fn unsupported_unix(path: &std::path::Path) -> TransportError {
    TransportError::Connect {
        addr: path.display().to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix domain sockets are not available on this platform",
        ),
    }
}
