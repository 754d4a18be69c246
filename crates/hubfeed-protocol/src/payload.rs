//! Push payload codec.
//!
//! Hubs compress pushed payloads before sending them as a string argument:
//!
//! ```text
//! json_text ──utf8──→ bytes ──raw deflate──→ compressed ──base64──→ wire text
//! ```
//!
//! "Raw" deflate means no zlib or gzip header and no trailing checksum,
//! just the DEFLATE block stream. [`WireCodec::decode`] walks the pipe
//! backwards.

use std::io::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::DecodeError;

/// Growth step for the inflate output buffer.
const INFLATE_CHUNK: usize = 4 * 1024;

/// Decodes (and, for tooling, encodes) pushed hub payloads.
///
/// Stateless, so it is a unit struct that is free to copy around.
///
/// ```rust
/// use hubfeed_protocol::WireCodec;
///
/// let codec = WireCodec;
/// let wire = codec.encode(r#"{"M":"BTC-USD"}"#).unwrap();
/// assert_eq!(codec.decode(&wire).unwrap(), r#"{"M":"BTC-USD"}"#);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl WireCodec {
    /// Decodes `base64(raw_deflate(utf8(text)))` back into `text`.
    ///
    /// # Errors
    /// - [`DecodeError::Base64`] for malformed base64
    /// - [`DecodeError::Inflate`] for a corrupt deflate stream
    /// - [`DecodeError::Truncated`] when the stream stops early
    /// - [`DecodeError::Utf8`] when the inflated bytes are not text
    pub fn decode(&self, wire_text: &str) -> Result<String, DecodeError> {
        let compressed = STANDARD.decode(wire_text)?;
        let inflated = inflate_raw(&compressed)?;
        Ok(String::from_utf8(inflated)?)
    }

    /// Encodes `text` the way a hub would before pushing it.
    ///
    /// Writing into a `Vec` cannot fail in practice, but the encoder API is
    /// fallible, so the `io::Result` is passed through.
    pub fn encode(&self, text: &str) -> std::io::Result<String> {
        let mut encoder =
            DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes())?;
        let compressed = encoder.finish()?;
        Ok(STANDARD.encode(compressed))
    }
}

/// Inflates a raw deflate stream, insisting on reaching its final block.
///
/// `flate2::read::DeflateDecoder` reports a cut-off stream as a clean EOF,
/// which would hand callers a partial document. Driving `Decompress`
/// directly lets us tell "finished" apart from "ran out of input".
fn inflate_raw(compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    // `false` = no zlib header.
    let mut inflater = Decompress::new(false);
    let mut out = Vec::with_capacity(compressed.len().saturating_mul(4));

    loop {
        if out.len() == out.capacity() {
            out.reserve(INFLATE_CHUNK);
        }
        let before_in = inflater.total_in();
        let before_out = inflater.total_out();
        let remaining = &compressed[before_in as usize..];

        // `Finish` fails outright on an undersized output buffer.
        let status = inflater.decompress_vec(
            remaining,
            &mut out,
            FlushDecompress::None,
        )?;

        if status == Status::StreamEnd {
            return Ok(out);
        }

        // No progress with room left in the output buffer: the input is
        // exhausted and the final block never arrived.
        let stalled = inflater.total_in() == before_in
            && inflater.total_out() == before_out;
        if stalled && out.len() < out.capacity() {
            return Err(DecodeError::Truncated);
        }
    }
}
