//! Length-prefixed framing and pluggable body codecs for muxrpc.
//!
//! Every frame on the wire carries:
//! - A 2-byte magic number ("MX") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 1-byte frame kind (options, header, body) and a reserved byte
//!
//! An RPC message is a HEADER frame followed by a BODY frame. Both payloads
//! are encoded with the codec negotiated during the handshake; see
//! [`CodecType`] for the available codecs.

pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod kind;
pub mod reader;
pub mod writer;

pub use codec::{CodecReader, CodecType, CodecWriter, BINCODE_TAG, JSON_TAG};
pub use error::{CodecError, Result};
pub use frame::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, FRAME_HEADER_SIZE,
};
pub use header::Header;
pub use kind::FrameKind;
pub use reader::FrameReader;
pub use writer::FrameWriter;
