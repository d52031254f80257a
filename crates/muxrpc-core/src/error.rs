use std::sync::Arc;
use std::time::Duration;

use muxrpc_codec::CodecError;

/// Errors surfaced by clients, servers and calls.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] muxrpc_transport::TransportError),

    /// Framing or codec error. Shared, because a dead connection fails every
    /// pending call with the same error.
    #[error("codec error: {0}")]
    Codec(Arc<CodecError>),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The client is closing or its connection has died.
    #[error("connection is shut down")]
    Shutdown,

    /// The server reported an application error for this call.
    #[error("{0}")]
    Server(String),

    /// No response arrived in time.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// A service with the same name is already registered.
    #[error("rpc: service already defined: {0}")]
    ServiceExists(String),

    /// Service or method name cannot be addressed as `"Service.Method"`.
    #[error("rpc: invalid service definition: {0}")]
    InvalidService(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        RpcError::Codec(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
