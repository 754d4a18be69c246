//! Error types for the protocol layer.
//!
//! Two enums live here. [`DecodeError`] is the narrow failure of the push
//! payload pipeline (base64 → inflate → UTF-8); callers drop the offending
//! message and keep going. [`ProtocolError`] covers hub frames.

/// A pushed payload could not be turned back into text.
///
/// Never carries a partial result: if any stage fails, the whole payload
/// is rejected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not standard, padded base64.
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The compressed stream is corrupt.
    #[error("payload is not a valid deflate stream: {0}")]
    Inflate(#[from] flate2::DecompressError),

    /// The compressed stream ended before its final block.
    #[error("deflate stream is truncated")]
    Truncated,

    /// The inflated bytes are not UTF-8.
    #[error("inflated payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Errors that can occur while encoding or decoding hub frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, a missing `type` field, or a
    /// truncated frame.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A pushed payload failed to decode.
    #[error(transparent)]
    Payload(#[from] DecodeError),

    /// A peer sent more than the allowed bytes without a record separator.
    #[error("unterminated frame of {size} bytes exceeds the {limit}-byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    /// The message is well-formed JSON but breaks a protocol rule, e.g.,
    /// an auth challenge that is not a string.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
