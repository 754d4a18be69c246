//! Challenge-response signing for hub authentication.
//!
//! Auth is a two-step exchange: the client asks the hub for a challenge
//! (`GetAuthContext(api_key)`), signs it with the API secret, and sends the
//! signature back (`Authenticate(api_key, signature)`). This module is the
//! middle step.

use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha512};

type HmacSha512 = Hmac<Sha512>;

/// Length of a signature: 64 bytes of HMAC-SHA512, two hex digits each.
pub const SIGNATURE_HEX_LEN: usize = 128;

/// Signs `challenge` with `secret`.
///
/// Computes HMAC-SHA512 keyed by the UTF-8 bytes of `secret` over the UTF-8
/// bytes of `challenge`, rendered as uppercase hex with no separators.
///
/// ```rust
/// use hubfeed_protocol::{create_signature, SIGNATURE_HEX_LEN};
///
/// let sig = create_signature("api-secret", "challenge-from-hub");
/// assert_eq!(sig.len(), SIGNATURE_HEX_LEN);
/// ```
pub fn create_signature(secret: &str, challenge: &str) -> String {
    hmac_sha512_hex(secret.as_bytes(), challenge.as_bytes())
}

fn hmac_sha512_hex(key: &[u8], message: &[u8]) -> String {
    // One full block: keys longer than that are hashed, shorter ones zero-padded.
    let mut block = Key::<HmacSha512>::default();
    if key.len() > block.len() {
        let digest = Sha512::digest(key);
        block[..digest.len()].copy_from_slice(&digest);
    } else {
        block[..key.len()].copy_from_slice(key);
    }
    let mut mac = <HmacSha512 as KeyInit>::new(&block);
    mac.update(message);
    hex::encode_upper(mac.finalize().into_bytes())
}
