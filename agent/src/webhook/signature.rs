//! HMAC-SHA256 webhook signature verification

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the signature header value
pub const SIGNATURE_PREFIX: &str = "sha256=";

fn digest(body: &[u8], secret: &[u8]) -> Vec<u8> {
    match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(body);
            mac.finalize().into_bytes().to_vec()
        }
        // HMAC accepts keys of any length
        Err(_) => Vec::new(),
    }
}

/// Compute the `sha256=<hex>` signature of `body` under `secret`
pub fn sign(body: &[u8], secret: &[u8]) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest(body, secret)))
}

/// Verify `header` against the HMAC of the raw body.
///
/// Absent, malformed or mismatched signatures all return `false`. An empty
/// secret never verifies. The digest comparison does not short-circuit on
/// the first differing byte.
pub fn verify(body: &[u8], header: Option<&str>, secret: &[u8]) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Some(supplied) = header.and_then(|h| h.trim().strip_prefix(SIGNATURE_PREFIX)) else {
        return false;
    };

    let Ok(supplied) = hex::decode(supplied) else {
        return false;
    };

    let expected = digest(body, secret);

    // Length is public (always 32 bytes); ct_eq on unequal lengths returns false
    expected.as_slice().ct_eq(supplied.as_slice()).into()
}
