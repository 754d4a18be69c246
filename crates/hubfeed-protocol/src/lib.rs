//! Wire protocol for hubfeed.
//!
//! This crate defines everything that has a fixed byte-level shape:
//!
//! - **Payload codec** ([`WireCodec`]): pushed payloads arrive as
//!   `base64(raw_deflate(utf8(json_text)))`; this turns them back into text.
//! - **Signer** ([`create_signature`]): answers an auth challenge with an
//!   uppercase-hex HMAC-SHA512.
//! - **Hub frames** ([`HubMessage`], [`HandshakeRequest`],
//!   [`HandshakeResponse`]): the JSON messages a hub connection exchanges,
//!   separated by [`RECORD_SEPARATOR`].
//! - **Frame codec** ([`Codec`] trait, [`JsonCodec`], [`FrameBuffer`]).
//! - **Errors** ([`ProtocolError`], [`DecodeError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (HubMessage / decoded text) → Registry (callbacks)
//! ```

mod codec;
mod error;
mod payload;
mod signer;
mod types;

pub use codec::{Codec, DEFAULT_MAX_PARTIAL_FRAME, FrameBuffer, JsonCodec, encode_frame};
pub use error::{DecodeError, ProtocolError};
pub use payload::WireCodec;
pub use signer::{SIGNATURE_HEX_LEN, create_signature};
pub use types::{
    HandshakeRequest, HandshakeResponse, HubMessage, RECORD_SEPARATOR,
};
