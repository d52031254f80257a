//! Stream transport for muxrpc.
//!
//! Provides the connected byte stream every other layer runs over:
//! - TCP listener with bind/accept
//! - TCP connect, optionally bounded by a timeout
//!
//! This is the lowest layer of muxrpc. Everything else builds on top of
//! the [`RpcStream`] type provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::RpcStream;
pub use tcp::TcpTransport;
