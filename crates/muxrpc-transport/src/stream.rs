use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected TCP stream carrying one RPC connection.
///
/// This is the fundamental I/O type returned by transport operations.
/// Currently it always wraps a TCP stream.
pub struct RpcStream {
    inner: RpcStreamInner,
}

enum RpcStreamInner {
    Tcp(TcpStream),
}

impl Read for RpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            RpcStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for RpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            RpcStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            RpcStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl From<TcpStream> for RpcStream {
    fn from(stream: TcpStream) -> Self {
        Self {
            inner: RpcStreamInner::Tcp(stream),
        }
    }
}

impl RpcStream {
    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            RpcStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            RpcStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Disable Nagle's algorithm. Request/response traffic is latency bound.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        match &self.inner {
            RpcStreamInner::Tcp(stream) => stream.set_nodelay(nodelay).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Both handles refer to the same connection, so one can be read on a
    /// dedicated thread while the other is written.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            RpcStreamInner::Tcp(stream) => {
                let cloned = stream.try_clone()?;
                Ok(Self::from(cloned))
            }
        }
    }

    /// Shut down both halves of the connection.
    ///
    /// Any thread blocked reading from a clone of this stream wakes up with
    /// EOF or an error. Shutting down an already disconnected stream is not
    /// an error.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            RpcStreamInner::Tcp(stream) => match stream.shutdown(Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
        }
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        match &self.inner {
            RpcStreamInner::Tcp(stream) => stream.peer_addr().map_err(Into::into),
        }
    }

    /// Address of the local end.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.inner {
            RpcStreamInner::Tcp(stream) => stream.local_addr().map_err(Into::into),
        }
    }
}

impl std::fmt::Debug for RpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            RpcStreamInner::Tcp(stream) => f
                .debug_struct("RpcStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
        }
    }
}
