use std::io::{Cursor, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// Per-operation I/O timeouts on a stream.
///
/// `None` disables the timeout. Implementations apply the value to the next
/// blocking read (or write) only; framing code re-arms it before every
/// underlying call to turn it into an absolute deadline.
pub trait Timeouts {
    /// Set the timeout applied to subsequent reads.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;

    /// Set the timeout applied to subsequent writes.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;
}

/// A connected duplex byte stream that can be split across threads.
///
/// One handle is read by exactly one reader, another is written by exactly
/// one writer, and a third is kept around to shut the connection down.
pub trait Transport: Read + Write + Timeouts + Send + Sized + 'static {
    /// Create another handle to the same underlying connection.
    fn try_clone(&self) -> std::io::Result<Self>;

    /// Shut down both directions, unblocking any thread parked in a read.
    fn shutdown(&self) -> std::io::Result<()>;
}

impl Timeouts for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
}

impl Transport for TcpStream {
    fn try_clone(&self) -> std::io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn shutdown(&self) -> std::io::Result<()> {
        ignore_not_connected(TcpStream::shutdown(self, Shutdown::Both))
    }
}

#[cfg(unix)]
impl Timeouts for std::os::unix::net::UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_write_timeout(self, timeout)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn try_clone(&self) -> std::io::Result<Self> {
        std::os::unix::net::UnixStream::try_clone(self)
    }

    fn shutdown(&self) -> std::io::Result<()> {
        ignore_not_connected(std::os::unix::net::UnixStream::shutdown(
            self,
            Shutdown::Both,
        ))
    }
}

// In-memory streams never block, so deadlines are meaningless for them.
impl<T> Timeouts for Cursor<T> {
    fn set_read_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
        Ok(())
    }

    fn set_write_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
        Ok(())
    }
}

impl Timeouts for Vec<u8> {
    fn set_read_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
        Ok(())
    }

    fn set_write_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
        Ok(())
    }
}

fn ignore_not_connected(result: std::io::Result<()>) -> std::io::Result<()> {
    match result {
        Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

/// A connected stream returned by transport bring-up.
///
/// Wraps either a TCP or a Unix domain socket stream so callers can stay
/// agnostic of the address family chosen by the endpoint.
pub struct NetStream {
    inner: NetStreamInner,
}

enum NetStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl NetStream {
    /// Create a NetStream from a TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: NetStreamInner::Tcp(stream),
        }
    }

    /// Create a NetStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: NetStreamInner::Unix(stream),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            NetStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            NetStreamInner::Unix(_) => "unix",
        }
    }
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            NetStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            NetStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            NetStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl Timeouts for NetStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => Timeouts::set_read_timeout(stream, timeout),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => Timeouts::set_read_timeout(stream, timeout),
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => Timeouts::set_write_timeout(stream, timeout),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => Timeouts::set_write_timeout(stream, timeout),
        }
    }
}

impl Transport for NetStream {
    fn try_clone(&self) -> std::io::Result<Self> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => Ok(Self::from_tcp(Transport::try_clone(stream)?)),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => Ok(Self::from_unix(Transport::try_clone(stream)?)),
        }
    }

    fn shutdown(&self) -> std::io::Result<()> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => Transport::shutdown(stream),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => Transport::shutdown(stream),
        }
    }
}

impl std::fmt::Debug for NetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
