//! Randomness, hashing and comparison primitives.
//!
//! Every generator draws from the OS RNG and returns an error instead of
//! panicking when the entropy source fails.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AuthError;

/// Bytes of entropy in opaque tokens (session IDs, CSRF, temp sessions).
pub const OPAQUE_TOKEN_BYTES: usize = 32;

pub fn random_bytes<const N: usize>() -> Result<[u8; N], AuthError> {
    let mut buf = [0u8; N];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| AuthError::Crypto(format!("OS RNG failure: {e}")))?;
    Ok(buf)
}

/// A 256-bit random token, base64url-encoded without padding.
pub fn opaque_token() -> Result<String, AuthError> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<OPAQUE_TOKEN_BYTES>()?))
}

/// A zero-padded decimal code of `digits` digits, uniformly distributed.
pub fn numeric_code(digits: u32) -> Result<String, AuthError> {
    let modulus = 10u32
        .checked_pow(digits)
        .ok_or_else(|| AuthError::Config(format!("{digits}-digit codes are not supported")))?;
    // Reject draws from the incomplete top bucket to avoid modulo bias.
    let zone = u32::MAX - (u32::MAX % modulus);
    loop {
        let draw = u32::from_le_bytes(random_bytes::<4>()?);
        if draw < zone {
            return Ok(format!("{:0width$}", draw % modulus, width = digits as usize));
        }
    }
}

/// SHA-256 of a token, hex-encoded. Used to key store entries so raw
/// bearer secrets are never written as keys.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
