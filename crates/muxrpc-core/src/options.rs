use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use muxrpc_codec::{CodecError, CodecType, FrameKind, FrameReader, FrameWriter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RpcError};

/// Identifies a muxrpc connection. Written by every client, checked by
/// every server.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

const MAX_CODEC_TAG_LEN: usize = 64;

/// Connection options sent by the client as the first frame of a connection.
///
/// Always JSON-encoded, whatever codec it selects, so a server can read it
/// before it knows the codec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Options {
    /// Must equal [`MAGIC_NUMBER`].
    pub magic_number: u32,
    /// Tag of the codec used for every message after the handshake.
    pub codec_type: String,
}

impl Default for Options {
    fn default() -> Self {
        Self::with_codec(CodecType::default())
    }
}

impl Options {
    /// Options selecting `codec`.
    pub fn with_codec(codec: CodecType) -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: codec.tag().to_string(),
        }
    }

    /// Fill in what a caller left out.
    ///
    /// Missing options become the defaults, an empty codec tag becomes the
    /// default codec, and the magic number is always overwritten.
    pub fn resolve(options: Option<Options>) -> Options {
        let mut options = options.unwrap_or_default();
        options.magic_number = MAGIC_NUMBER;
        if options.codec_type.is_empty() {
            options.codec_type = CodecType::default().tag().to_string();
        }
        options
    }

    /// Look up the codec these options select.
    pub fn codec(&self) -> Result<CodecType> {
        Ok(CodecType::from_tag(&self.codec_type)?)
    }
}

/// Configuration for the server side of the handshake.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// How long a new connection has to deliver its options.
    pub timeout: Duration,
    /// Maximum options frame payload size in bytes.
    pub max_handshake_payload: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_handshake_payload: 16 * 1024,
        }
    }
}

/// Send connection options. There is no reply; the client starts writing
/// requests right away.
pub fn handshake_client<W: Write>(writer: &mut FrameWriter<W>, options: &Options) -> Result<()> {
    let payload = serde_json::to_vec(options)?;
    writer.send(FrameKind::Options, &payload)?;
    debug!(codec = %options.codec_type, "sent connection options");
    Ok(())
}

/// Read and validate connection options, returning the selected codec.
///
/// The reader must keep serving the connection afterwards, since requests
/// sent right behind the options may already sit in its buffer.
pub fn handshake_server<R: Read>(
    reader: &mut FrameReader<R>,
    config: &HandshakeConfig,
) -> Result<CodecType> {
    let deadline = Instant::now() + config.timeout;
    let payload = recv_options_payload(reader, deadline, config)?;
    let options: Options = serde_json::from_slice(&payload)?;

    if options.magic_number != MAGIC_NUMBER {
        return Err(RpcError::HandshakeFailed(format!(
            "invalid magic number {:#x}",
            options.magic_number
        )));
    }

    if options.codec_type.len() > MAX_CODEC_TAG_LEN {
        return Err(RpcError::HandshakeFailed(format!(
            "codec tag too long: {} bytes (max {MAX_CODEC_TAG_LEN})",
            options.codec_type.len()
        )));
    }

    CodecType::from_tag(&options.codec_type).map_err(|_| {
        RpcError::HandshakeFailed(format!("invalid codec type {:?}", options.codec_type))
    })
}

fn recv_options_payload<R: Read>(
    reader: &mut FrameReader<R>,
    deadline: Instant,
    config: &HandshakeConfig,
) -> Result<Vec<u8>> {
    loop {
        if Instant::now() >= deadline {
            return Err(RpcError::Timeout(config.timeout));
        }

        match reader.read_frame() {
            Ok(frame) => {
                if frame.kind != FrameKind::Options {
                    return Err(RpcError::HandshakeFailed(format!(
                        "expected options frame, got {}",
                        frame.kind
                    )));
                }
                if frame.payload.len() > config.max_handshake_payload {
                    return Err(RpcError::HandshakeFailed(format!(
                        "options payload too large: {} (max {})",
                        frame.payload.len(),
                        config.max_handshake_payload
                    )));
                }
                return Ok(frame.payload.to_vec());
            }
            Err(CodecError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(CodecError::ConnectionClosed) => {
                return Err(RpcError::HandshakeFailed(
                    "connection closed during handshake".to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        }
    }
}
