use std::fmt;
use std::io;

use muxrpc_codec::CodecError;
use muxrpc_core::RpcError;
use muxrpc_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => FAILURE,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: &TransportError) -> CliError {
    let code = match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_code(source.kind()),
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn codec_error(context: &str, err: &CodecError) -> CliError {
    let code = match err {
        CodecError::Io(source) => io_code(source.kind()),
        CodecError::ConnectionClosed => FAILURE,
        CodecError::UnknownCodec(_) => USAGE,
        CodecError::PayloadTooLarge { .. }
        | CodecError::Json(_)
        | CodecError::Encode(_)
        | CodecError::Decode(_)
        | CodecError::TrailingBytes { .. } => DATA_INVALID,
        CodecError::InvalidMagic
        | CodecError::UnexpectedFrame { .. }
        | CodecError::UnknownFrameKind(_) => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match &err {
        RpcError::Transport(err) => transport_error(context, err),
        RpcError::Codec(err) => codec_error(context, err),
        RpcError::HandshakeFailed(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        RpcError::Shutdown | RpcError::Server(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        RpcError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        RpcError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        RpcError::ServiceExists(_) | RpcError::InvalidService(_) | RpcError::Spawn { .. } => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
    }
}
