//! Frame kinds.
//!
//! The kind byte tells the reader what a frame's payload holds, so a reader
//! that loses track of the header/body pairing fails loudly instead of
//! decoding a body as a header.

use std::fmt;

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Connection preamble (handshake options). Sent once, JSON encoded.
    Options = 0,
    /// Message header, encoded with the negotiated codec.
    Header = 1,
    /// Message body, encoded with the negotiated codec.
    Body = 2,
}

impl FrameKind {
    /// The byte written on the wire.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte. Unassigned values yield `None`.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Options),
            1 => Some(Self::Header),
            2 => Some(Self::Body),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Header => "HEADER",
            Self::Body => "BODY",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_bytes_are_stable() {
        assert_eq!(FrameKind::Options.as_byte(), 0);
        assert_eq!(FrameKind::Header.as_byte(), 1);
        assert_eq!(FrameKind::Body.as_byte(), 2);
    }

    #[test]
    fn unassigned_bytes_are_rejected() {
        assert_eq!(FrameKind::from_byte(1), Some(FrameKind::Header));
        assert_eq!(FrameKind::from_byte(3), None);
        assert_eq!(FrameKind::from_byte(0xff), None);
    }

    #[test]
    fn displays_upper_case_name() {
        assert_eq!(FrameKind::Body.to_string(), "BODY");
    }
}
