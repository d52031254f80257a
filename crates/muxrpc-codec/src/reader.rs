use std::io::{ErrorKind, Read};
use std::time::Duration;

use bytes::BytesMut;
use muxrpc_transport::RpcStream;

use crate::error::{transport_to_codec_error, CodecError, Result};
use crate::frame::{decode_frame, Frame, FrameConfig};
use crate::kind::FrameKind;

const READ_CHUNK: usize = 8 * 1024;

/// Blocking frame reader over a byte stream.
///
/// Bytes read past the end of a frame stay buffered for the next call, so
/// once a reader has been used it must serve the rest of the connection
/// (the handshake reader becomes the codec reader).
pub struct FrameReader<T> {
    stream: T,
    pending: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: T, config: FrameConfig) -> Self {
        Self {
            stream,
            pending: BytesMut::with_capacity(READ_CHUNK),
            config,
        }
    }

    /// Block until a whole frame is buffered and return it.
    ///
    /// EOF, whether between frames or inside one, is
    /// `CodecError::ConnectionClosed`.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.pending, self.config.max_payload_size)? {
                return Ok(frame);
            }
            self.fill()?;
        }
    }

    /// Read the next frame, failing if it is not of kind `expected`.
    pub fn read_frame_of(&mut self, expected: FrameKind) -> Result<Frame> {
        let frame = self.read_frame()?;
        if frame.kind != expected {
            return Err(CodecError::UnexpectedFrame {
                expected,
                got: frame.kind,
            });
        }
        Ok(frame)
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(CodecError::ConnectionClosed),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(CodecError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    /// Change the payload limit for frames not yet decoded.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<RpcStream> {
    /// Wrap a connected stream, applying the configured read timeout to it.
    pub fn with_config_stream(stream: RpcStream, config: FrameConfig) -> Result<Self> {
        stream
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_codec_error)?;
        Ok(Self::with_config(stream, config))
    }

    /// Change the read timeout of the underlying stream.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream
            .set_read_timeout(timeout)
            .map_err(transport_to_codec_error)?;
        self.config.read_timeout = timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;
    use crate::frame::encode_frame;

    fn wire(frames: &[(FrameKind, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (kind, payload) in frames {
            encode_frame(*kind, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    /// Hands out at most `step` bytes per read, optionally failing with
    /// `Interrupted` before every successful read.
    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
        step: usize,
        interrupt: bool,
        interrupted: bool,
    }

    impl Trickle {
        fn new(bytes: Vec<u8>, step: usize) -> Self {
            Self {
                bytes,
                pos: 0,
                step,
                interrupt: false,
                interrupted: false,
            }
        }
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt && !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            self.interrupted = false;
            let n = self.step.min(buf.len()).min(self.bytes.len() - self.pos);
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn reads_header_body_pair() {
        let bytes = wire(&[(FrameKind::Header, b"h1"), (FrameKind::Body, b"b1")]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let header = reader.read_frame_of(FrameKind::Header).unwrap();
        let body = reader.read_frame_of(FrameKind::Body).unwrap();
        assert_eq!(header.payload.as_ref(), b"h1");
        assert_eq!(body.payload.as_ref(), b"b1");
        assert!(matches!(reader.read_frame(), Err(CodecError::ConnectionClosed)));
    }

    #[test]
    fn reassembles_frames_from_single_byte_reads() {
        let body = vec![0x5a; 3 * READ_CHUNK];
        let bytes = wire(&[(FrameKind::Header, b"seq"), (FrameKind::Body, &body)]);
        let mut reader = FrameReader::new(Trickle::new(bytes, 1));

        assert_eq!(reader.read_frame().unwrap().kind, FrameKind::Header);
        assert_eq!(reader.read_frame().unwrap().payload.len(), body.len());
    }

    #[test]
    fn retries_interrupted_reads() {
        let bytes = wire(&[(FrameKind::Options, b"{}")]);
        let mut trickle = Trickle::new(bytes, 3);
        trickle.interrupt = true;
        let mut reader = FrameReader::new(trickle);

        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"{}");
    }

    #[test]
    fn frames_after_options_stay_buffered() {
        let bytes = wire(&[
            (FrameKind::Options, b"{}"),
            (FrameKind::Header, b"h"),
            (FrameKind::Body, b"b"),
        ]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        reader.read_frame_of(FrameKind::Options).unwrap();
        let rest: Vec<_> = (0..2).map(|_| reader.read_frame().unwrap().kind).collect();
        assert_eq!(rest, [FrameKind::Header, FrameKind::Body]);
    }

    #[test]
    fn body_where_header_expected_is_rejected() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[(FrameKind::Body, b"x")])));
        let err = reader.read_frame_of(FrameKind::Header).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnexpectedFrame {
                expected: FrameKind::Header,
                got: FrameKind::Body,
            }
        ));
        assert_eq!(err.to_string(), "unexpected BODY frame (expected HEADER)");
    }

    #[test]
    fn eof_inside_frame_is_connection_closed() {
        let mut bytes = wire(&[(FrameKind::Body, b"truncated payload")]);
        bytes.truncate(bytes.len() - 4);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(reader.read_frame(), Err(CodecError::ConnectionClosed)));
    }

    #[test]
    fn payload_limit_can_be_raised_later() {
        let bytes = wire(&[(FrameKind::Body, &[1u8; 64])]);
        let config = FrameConfig::with_max_payload(16);
        let mut reader = FrameReader::with_config(Cursor::new(bytes), config);
        assert!(matches!(
            reader.read_frame(),
            Err(CodecError::PayloadTooLarge { size: 64, max: 16 })
        ));

        reader.set_max_payload_size(64);
        assert_eq!(reader.read_frame().unwrap().payload.len(), 64);
    }

    #[test]
    fn read_timeout_surfaces_as_io_error() {
        let listener = muxrpc_transport::TcpTransport::bind("127.0.0.1:0").unwrap();
        let _peer = muxrpc_transport::TcpTransport::connect(listener.local_addr()).unwrap();
        let stream = listener.accept().unwrap();

        let config = FrameConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_stream(stream, config).unwrap();
        assert!(matches!(
            reader.read_frame(),
            Err(CodecError::Io(ref e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut
        ));
    }
}
