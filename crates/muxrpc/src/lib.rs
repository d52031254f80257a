//! Concurrent RPC calls multiplexed over a single connection.
//!
//! A client sends many calls at once over one TCP stream; each request
//! carries a sequence number and the server's responses, which may come back
//! in any order, are matched to their callers by it. Message bodies use a
//! codec negotiated when the connection opens.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and stream
//! - [`codec`]: frame format, message header and body codecs
//! - [`rpc`]: handshake, multiplexing client, server and service registry
//!
//! The most used items are re-exported at the crate root.
//!
//! ```no_run
//! use muxrpc::{dial, Server, Service, ServiceRegistry};
//! use muxrpc::transport::TcpTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ServiceRegistry::new()
//!     .with_service(Service::new("Arith").method("Sum", |(a, b): (i64, i64)| Ok(a + b)))?;
//! let listener = TcpTransport::bind("127.0.0.1:4700")?;
//! std::thread::spawn(move || Server::new(registry).accept(&listener));
//!
//! let client = dial("127.0.0.1:4700", None)?;
//! let sum: i64 = client.call("Arith.Sum", &(2, 3))?;
//! assert_eq!(sum, 5);
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use muxrpc_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use muxrpc_codec::*;
}

/// Re-export client and server types.
pub mod rpc {
    pub use muxrpc_core::*;
}

pub use muxrpc_core::{
    dial, dial_timeout, AsyncCall, Call, Client, CodecType, Options, RpcError, Server,
    ServerConfig, Service, ServiceRegistry,
};
