//! Call multiplexing over a single connection.
//!
//! A [`Client`] sends many concurrent calls over one stream and matches each
//! response to its caller by sequence number. A [`Server`] reads requests off
//! a connection, dispatches them concurrently and writes the responses back
//! in whatever order they finish.

pub mod call;
pub mod client;
pub mod error;
pub mod options;
pub mod server;
pub mod service;

pub use call::{AsyncCall, Call, DONE_CHANNEL_CAPACITY};
pub use client::{dial, dial_timeout, Client};
pub use error::{Result, RpcError};
pub use options::{handshake_client, handshake_server, HandshakeConfig, Options, MAGIC_NUMBER};
pub use server::{Dispatch, Request, Server, ServerConfig};
pub use service::{Service, ServiceRegistry};

/// Channel types for [`Client::go_with_done`].
pub use crossbeam::channel;
pub use muxrpc_codec::{CodecType, Header};
