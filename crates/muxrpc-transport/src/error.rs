/// Socket-level failures, tagged with the operation that hit them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Dialing a server failed, including connect timeouts.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(std::io::Error),

    /// Socket option, clone or shutdown failure on an open stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
