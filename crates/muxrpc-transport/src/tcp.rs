use std::fmt::Display;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::RpcStream;

/// TCP socket transport.
///
/// Provides bind/accept/connect over TCP. Accepted and connected streams
/// have Nagle's algorithm disabled.
pub struct TcpTransport {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on a TCP address.
    ///
    /// Binding port `0` picks a free port; use [`TcpTransport::local_addr`]
    /// to find out which.
    pub fn bind<A: ToSocketAddrs + Display>(addr: A) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        info!(addr = %local, "listening on tcp socket");

        Ok(Self {
            listener,
            addr: local,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<RpcStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        let stream = RpcStream::from(stream);
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Connect to a listening TCP socket (blocking).
    pub fn connect<A: ToSocketAddrs + Display>(addr: A) -> Result<RpcStream> {
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(%addr, "connected to tcp socket");
        let stream = RpcStream::from(stream);
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Connect, giving up after `timeout`.
    ///
    /// Every resolved address is tried in turn; the last error is returned
    /// if none accepts within the timeout.
    pub fn connect_timeout<A: ToSocketAddrs + Display>(
        addr: A,
        timeout: Duration,
    ) -> Result<RpcStream> {
        let candidates = addr.to_socket_addrs().map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;

        let mut last_err = std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "address resolved to no socket addresses",
        );
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    debug!(addr = %candidate, ?timeout, "connected to tcp socket");
                    let stream = RpcStream::from(stream);
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(err) => last_err = err,
            }
        }

        Err(TransportError::Connect {
            addr: addr.to_string(),
            source: last_err,
        })
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("addr", &self.addr)
            .finish()
    }
}
