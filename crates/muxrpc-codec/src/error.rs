use muxrpc_transport::TransportError;

use crate::kind::FrameKind;

/// Failures while framing a connection or encoding the values it carries.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The stream is not speaking this protocol, or lost frame alignment.
    #[error("invalid frame magic (expected 0x4d58 \"MX\")")]
    InvalidMagic,

    /// A frame is larger than the reader or writer allows.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame of a different kind arrived than the one the protocol expects next.
    #[error("unexpected {got} frame (expected {expected})")]
    UnexpectedFrame { expected: FrameKind, got: FrameKind },

    /// The kind byte of a frame is not assigned.
    #[error("unknown frame kind {0:#04x}")]
    UnknownFrameKind(u8),

    /// The negotiated codec tag is not registered.
    #[error("invalid codec type {0:?}")]
    UnknownCodec(String),

    /// JSON encoding or decoding failed.
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary encoding failed.
    #[error("bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Binary decoding failed.
    #[error("bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// A binary payload decoded cleanly but left bytes unread.
    #[error("trailing bytes after value ({consumed} of {len} bytes consumed)")]
    TrailingBytes { consumed: usize, len: usize },

    /// The stream failed, including read timeouts.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// EOF from the peer, between frames or inside one.
    #[error("connection closed by peer")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, CodecError>;

pub(crate) fn transport_to_codec_error(err: TransportError) -> CodecError {
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => CodecError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            CodecError::Io(source)
        }
    }
}
