use serde::{Deserialize, Serialize};

/// Per-message header, sent ahead of every request and response body.
///
/// Every field is always encoded: binary codecs are positional, so fields
/// must never be skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Target method, `"Service.Method"`.
    pub service_method: String,
    /// Client-assigned sequence number correlating a response to its request.
    pub seq: u64,
    /// Empty on success. On a response, a non-empty value carries the
    /// server-side failure and the body is ignored.
    pub error: String,
}

impl Header {
    /// Header for an outgoing request.
    pub fn request(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Whether this header reports a server-side failure.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}
