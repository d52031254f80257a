use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use muxrpc_transport::RpcStream;

use crate::error::{transport_to_codec_error, CodecError, Result};
use crate::frame::{encode_frame, FrameConfig, FRAME_HEADER_SIZE};
use crate::kind::FrameKind;

/// Blocking frame writer over a byte stream.
///
/// Not synchronized: concurrent senders must share a writer behind a lock.
pub struct FrameWriter<T> {
    stream: T,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: T, config: FrameConfig) -> Self {
        Self {
            stream,
            scratch: BytesMut::with_capacity(FRAME_HEADER_SIZE * 2),
            config,
        }
    }

    /// Send a single frame.
    pub fn send(&mut self, kind: FrameKind, payload: &[u8]) -> Result<()> {
        self.send_frames(&[(kind, payload)])
    }

    /// Send several frames with one buffered write.
    ///
    /// Every payload is checked against the limit before anything is
    /// encoded, so an oversized frame leaves the stream untouched.
    pub fn send_frames(&mut self, frames: &[(FrameKind, &[u8])]) -> Result<()> {
        let max = self.config.max_payload_size;
        if let Some((_, payload)) = frames.iter().find(|(_, payload)| payload.len() > max) {
            return Err(CodecError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        self.scratch.clear();
        for (kind, payload) in frames {
            encode_frame(*kind, payload, &mut self.scratch)?;
        }
        write_fully(&mut self.stream, &self.scratch)?;
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.stream.flush() {
                Ok(()) => return Ok(()),
                Err(err) if retryable(&err) => {}
                Err(err) => return Err(CodecError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }

    /// Change the payload limit for frames not yet sent.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<RpcStream> {
    /// Wrap a connected stream, applying the configured write timeout to it.
    pub fn with_config_stream(stream: RpcStream, config: FrameConfig) -> Result<Self> {
        stream
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_codec_error)?;
        Ok(Self::with_config(stream, config))
    }
}

fn write_fully<T: Write>(stream: &mut T, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        match stream.write(bytes) {
            Ok(0) => return Err(CodecError::ConnectionClosed),
            Ok(n) => bytes = &bytes[n..],
            Err(err) if retryable(&err) => {}
            Err(err) => return Err(CodecError::Io(err)),
        }
    }
    Ok(())
}

// A blocking socket reports an expired write timeout as `WouldBlock`, so
// only `Interrupted` is retried.
fn retryable(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted
}
