use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::error::{CodecError, Result};
use crate::header::Header;
use crate::kind::FrameKind;
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// Wire tag of the JSON codec.
pub const JSON_TAG: &str = "application/json";

/// Wire tag of the binary codec.
pub const BINCODE_TAG: &str = "application/bincode";

/// The closed set of body codecs, selected by the tag carried in the
/// handshake options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecType {
    /// Self-describing text, `serde_json`.
    Json,
    /// Compact positional binary, `bincode` standard configuration.
    #[default]
    Bincode,
}

impl CodecType {
    /// Every registered codec.
    pub const ALL: [CodecType; 2] = [CodecType::Json, CodecType::Bincode];

    /// The tag sent on the wire for this codec.
    pub fn tag(self) -> &'static str {
        match self {
            CodecType::Json => JSON_TAG,
            CodecType::Bincode => BINCODE_TAG,
        }
    }

    /// Resolve a wire tag to a codec.
    ///
    /// An unknown tag is a configuration error, not something to retry.
    pub fn from_tag(tag: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|codec| codec.tag() == tag)
            .ok_or_else(|| CodecError::UnknownCodec(tag.to_string()))
    }

    /// Encode a value with this codec.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            CodecType::Json => Ok(serde_json::to_vec(value)?),
            CodecType::Bincode => Ok(bincode::serde::encode_to_vec(
                value,
                bincode::config::standard(),
            )?),
        }
    }

    /// Decode a value with this codec. The whole payload must be consumed.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            CodecType::Json => Ok(serde_json::from_slice(bytes)?),
            CodecType::Bincode => {
                let (value, consumed) =
                    bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
                if consumed != bytes.len() {
                    return Err(CodecError::TrailingBytes {
                        consumed,
                        len: bytes.len(),
                    });
                }
                Ok(value)
            }
        }
    }

    /// Build the codec halves for a connection from its frame reader and
    /// writer.
    ///
    /// The frame reader is taken as-is so bytes it buffered past the
    /// handshake are not lost.
    pub fn new_codec<R: Read, W: Write>(
        self,
        reader: FrameReader<R>,
        writer: FrameWriter<W>,
    ) -> (CodecReader<R>, CodecWriter<W>) {
        (
            CodecReader {
                frames: reader,
                codec: self,
            },
            CodecWriter {
                frames: writer,
                codec: self,
            },
        )
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for CodecType {
    type Err = CodecError;

    /// Accepts a wire tag or the short names `json` / `bincode`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(CodecType::Json),
            "bincode" => Ok(CodecType::Bincode),
            tag => CodecType::from_tag(tag),
        }
    }
}

/// Read half of a codec: headers and bodies, always as a strict pair.
pub struct CodecReader<R> {
    frames: FrameReader<R>,
    codec: CodecType,
}

impl<R: Read> CodecReader<R> {
    /// The codec decoding this connection.
    pub fn codec_type(&self) -> CodecType {
        self.codec
    }

    /// Read and decode the next message header.
    pub fn read_header(&mut self) -> Result<Header> {
        let frame = self.frames.read_frame_of(FrameKind::Header)?;
        let header: Header = self.codec.decode(&frame.payload)?;
        trace!(seq = header.seq, service_method = %header.service_method, "read header");
        Ok(header)
    }

    /// Read the body that follows a header without decoding it.
    pub fn read_body_raw(&mut self) -> Result<Bytes> {
        Ok(self.frames.read_frame_of(FrameKind::Body)?.payload)
    }

    /// Read the body that follows a header and decode it as `T`.
    ///
    /// The body frame is consumed even when decoding fails, so the stream
    /// stays framed.
    pub fn read_body<T: DeserializeOwned>(&mut self) -> Result<T> {
        let raw = self.read_body_raw()?;
        self.codec.decode(&raw)
    }

    /// Consume and drop the body that follows a header.
    pub fn discard_body(&mut self) -> Result<()> {
        self.read_body_raw().map(drop)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        self.frames.get_ref()
    }
}

/// Write half of a codec.
pub struct CodecWriter<W> {
    frames: FrameWriter<W>,
    codec: CodecType,
}

impl<W: Write> CodecWriter<W> {
    /// The codec encoding this connection.
    pub fn codec_type(&self) -> CodecType {
        self.codec
    }

    /// Encode and write a header followed by its body.
    ///
    /// Encoding happens before anything touches the stream, so an
    /// unserializable body leaves the connection framed.
    pub fn write<T: Serialize + ?Sized>(&mut self, header: &Header, body: &T) -> Result<()> {
        let body = self.codec.encode(body)?;
        self.write_raw(header, &body)
    }

    /// Write a header followed by an already encoded body.
    pub fn write_raw(&mut self, header: &Header, body: &[u8]) -> Result<()> {
        let head = self.codec.encode(header)?;
        self.frames.send_frames(&[(FrameKind::Header, &head), (FrameKind::Body, body)])?;
        trace!(seq = header.seq, service_method = %header.service_method, "wrote message");
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        self.frames.get_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Args {
        num1: i64,
        num2: i64,
    }

    fn pipe(codec: CodecType, wire: Vec<u8>) -> CodecReader<Cursor<Vec<u8>>> {
        codec
            .new_codec(
                FrameReader::new(Cursor::new(wire)),
                FrameWriter::new(std::io::sink()),
            )
            .0
    }

    fn written<F>(codec: CodecType, f: F) -> Vec<u8>
    where
        F: FnOnce(&mut CodecWriter<Cursor<Vec<u8>>>),
    {
        let (_, mut writer) = codec.new_codec(
            FrameReader::new(std::io::empty()),
            FrameWriter::new(Cursor::new(Vec::new())),
        );
        f(&mut writer);
        writer.frames.into_inner().into_inner()
    }

    #[test]
    fn tags_resolve_to_codecs() {
        assert_eq!(CodecType::from_tag(JSON_TAG).unwrap(), CodecType::Json);
        assert_eq!(CodecType::from_tag(BINCODE_TAG).unwrap(), CodecType::Bincode);
        for codec in CodecType::ALL {
            assert_eq!(CodecType::from_tag(codec.tag()).unwrap(), codec);
        }
    }

    #[test]
    fn unknown_tag_rejected() {
        let err = CodecType::from_tag("application/gob").unwrap_err();
        assert!(matches!(err, CodecError::UnknownCodec(ref tag) if tag == "application/gob"));
    }

    #[test]
    fn short_names_parse() {
        assert_eq!("json".parse::<CodecType>().unwrap(), CodecType::Json);
        assert_eq!("bincode".parse::<CodecType>().unwrap(), CodecType::Bincode);
        assert_eq!(JSON_TAG.parse::<CodecType>().unwrap(), CodecType::Json);
        assert!("xml".parse::<CodecType>().is_err());
    }

    #[test]
    fn default_codec_is_binary() {
        assert_eq!(CodecType::default(), CodecType::Bincode);
    }

    #[test]
    fn message_pairs_read_back_with_both_codecs() {
        for codec in CodecType::ALL {
            let wire = written(codec, |w| {
                w.write(&Header::request("Arith.Sum", 1), &Args { num1: 3, num2: 4 })
                    .unwrap();
                w.write(&Header::request("Echo.Say", 2), "hi").unwrap();
            });

            let mut reader = pipe(codec, wire);
            let h1 = reader.read_header().unwrap();
            assert_eq!(h1, Header::request("Arith.Sum", 1));
            let args: Args = reader.read_body().unwrap();
            assert_eq!(args, Args { num1: 3, num2: 4 });

            let h2 = reader.read_header().unwrap();
            assert_eq!(h2.seq, 2);
            let said: String = reader.read_body().unwrap();
            assert_eq!(said, "hi");
        }
    }

    #[test]
    fn discarded_body_keeps_stream_framed() {
        let wire = written(CodecType::Json, |w| {
            w.write(&Header::request("Stale.Call", 7), &vec![1u8; 512])
                .unwrap();
            w.write(&Header::request("Fresh.Call", 8), &42u32).unwrap();
        });

        let mut reader = pipe(CodecType::Json, wire);
        assert_eq!(reader.read_header().unwrap().seq, 7);
        reader.discard_body().unwrap();
        assert_eq!(reader.read_header().unwrap().seq, 8);
        assert_eq!(reader.read_body::<u32>().unwrap(), 42);
    }

    #[test]
    fn body_decode_failure_still_consumes_frame() {
        let wire = written(CodecType::Bincode, |w| {
            w.write(&Header::request("A.B", 1), "not a number").unwrap();
            w.write(&Header::request("A.B", 2), &5u8).unwrap();
        });

        let mut reader = pipe(CodecType::Bincode, wire);
        reader.read_header().unwrap();
        assert!(reader.read_body::<Args>().is_err());
        assert_eq!(reader.read_header().unwrap().seq, 2);
    }

    #[test]
    fn error_header_with_unit_body() {
        let wire = written(CodecType::Bincode, |w| {
            let header = Header {
                service_method: "Foo.Sum".to_string(),
                seq: 3,
                error: "boom".to_string(),
            };
            w.write(&header, &()).unwrap();
        });

        let mut reader = pipe(CodecType::Bincode, wire);
        let header = reader.read_header().unwrap();
        assert!(header.is_error());
        assert_eq!(header.error, "boom");
        reader.discard_body().unwrap();
    }

    #[test]
    fn bincode_rejects_trailing_bytes() {
        let bytes = CodecType::Bincode.encode(&(1u8, 2u8)).unwrap();
        let err = CodecType::Bincode.decode::<u8>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::TrailingBytes { consumed: 1, len: 2 }));
    }

    #[test]
    fn body_before_header_is_rejected() {
        let mut wire = bytes::BytesMut::new();
        crate::frame::encode_frame(FrameKind::Body, b"{}", &mut wire).unwrap();

        let mut reader = pipe(CodecType::Json, wire.to_vec());
        assert!(matches!(
            reader.read_header(),
            Err(CodecError::UnexpectedFrame { .. })
        ));
    }
}
