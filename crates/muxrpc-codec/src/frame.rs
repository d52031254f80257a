use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::kind::FrameKind;

/// Bytes in front of every payload: magic (2) + length (4) + kind (1) + reserved (1).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Frame magic, `"MX"`.
pub const MAGIC: [u8; 2] = *b"MX";

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One frame off the wire.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Size of this frame on the wire, prefix included.
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }
}

/// Append one frame to `dst`.
///
/// ```text
/// ┌────────────┬───────────┬──────────┬──────────┬─────────────────┐
/// │ Magic (2B) │ Length    │ Kind     │ Reserved │ Payload         │
/// │ "MX"       │ (4B LE)   │ (1B)     │ (1B, 0)  │ (Length bytes)  │
/// └────────────┴───────────┴──────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(kind: FrameKind, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| CodecError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(FRAME_HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u8(kind.as_byte());
    dst.put_u8(0);
    dst.put_slice(payload);
    Ok(())
}

/// Split the next complete frame off the front of `src`.
///
/// `Ok(None)` means more bytes are needed and `src` is untouched. The prefix
/// is checked as soon as it is complete, so a corrupt or oversized frame is
/// reported without waiting for its payload.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(mut prefix) = src.get(..FRAME_HEADER_SIZE) else {
        return Ok(None);
    };

    if prefix[..MAGIC.len()] != MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    prefix.advance(MAGIC.len());
    let len = prefix.get_u32_le() as usize;
    let kind_byte = prefix.get_u8();
    let kind = FrameKind::from_byte(kind_byte).ok_or(CodecError::UnknownFrameKind(kind_byte))?;

    if len > max_payload {
        return Err(CodecError::PayloadTooLarge {
            size: len,
            max: max_payload,
        });
    }
    if src.len() < FRAME_HEADER_SIZE + len {
        return Ok(None);
    }

    src.advance(FRAME_HEADER_SIZE);
    let payload = src.split_to(len).freeze();
    Ok(Some(Frame { kind, payload }))
}

/// Limits and timeouts for one direction of a connection.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload accepted or sent, in bytes.
    pub max_payload_size: usize,
    /// Applied to the stream by `FrameReader::with_config_stream`.
    pub read_timeout: Option<Duration>,
    /// Applied to the stream by `FrameWriter::with_config_stream`.
    pub write_timeout: Option<Duration>,
}

impl FrameConfig {
    /// Default timeouts with a different payload limit.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            max_payload_size,
            ..Self::default()
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
