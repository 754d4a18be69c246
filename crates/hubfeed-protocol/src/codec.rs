//! Codec trait, the JSON implementation, and record-separator framing.
//!
//! A "codec" converts between Rust types and raw bytes. The hub client does
//! not care how frames are serialized; it only needs something that
//! implements [`Codec`]. [`JsonCodec`] is the one hubs speak today.
//!
//! On top of that sits framing: each frame on the wire is followed by
//! [`RECORD_SEPARATOR`], and one transport message may carry several
//! frames (or, in principle, part of one). [`encode_frame`] adds the
//! separator; [`FrameBuffer`] splits incoming bytes back into frames.

use serde::{Serialize, de::DeserializeOwned};

use crate::{ProtocolError, RECORD_SEPARATOR};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec is shared with the receive
/// task for the lifetime of a connection.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use hubfeed_protocol::{Codec, HubMessage, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&HubMessage::Ping).unwrap();
/// assert_eq!(bytes, br#"{"type":6}"#);
///
/// let decoded: HubMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, HubMessage::Ping);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Encodes `value` and appends the record separator.
pub fn encode_frame<C: Codec, T: Serialize>(
    codec: &C,
    value: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = codec.encode(value)?;
    bytes.push(RECORD_SEPARATOR);
    Ok(bytes)
}

/// Default cap on the bytes of one unfinished frame (1 MiB).
pub const DEFAULT_MAX_PARTIAL_FRAME: usize = 1024 * 1024;

/// Accumulates transport messages and yields complete frames.
///
/// Bytes after the last separator stay buffered until the rest of that
/// frame arrives, up to a size limit.
#[derive(Debug)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    max_partial: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_PARTIAL_FRAME)
    }
}

impl FrameBuffer {
    /// Creates an empty buffer with the default partial-frame limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer that holds at most `max_partial` bytes of
    /// an unfinished frame.
    pub fn with_limit(max_partial: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_partial,
        }
    }

    /// Appends `data` and drains every complete frame, separators removed.
    /// Empty frames (back-to-back separators) are skipped.
    ///
    /// # Errors
    /// Returns `ProtocolError::FrameTooLarge` and discards the buffered
    /// bytes when the unfinished tail exceeds the limit.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, ProtocolError> {
        self.pending.extend_from_slice(data);

        let frames = match self
            .pending
            .iter()
            .rposition(|&b| b == RECORD_SEPARATOR)
        {
            Some(last) => {
                let complete: Vec<u8> = self.pending.drain(..=last).collect();
                complete
                    .split(|&b| b == RECORD_SEPARATOR)
                    .filter(|frame| !frame.is_empty())
                    .map(<[u8]>::to_vec)
                    .collect()
            }
            None => Vec::new(),
        };

        if self.pending.len() > self.max_partial {
            let size = self.pending.len();
            self.pending = Vec::new();
            return Err(ProtocolError::FrameTooLarge {
                size,
                limit: self.max_partial,
            });
        }
        Ok(frames)
    }

    /// Returns `true` if a partial frame is waiting for more bytes.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }
}
