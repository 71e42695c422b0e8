//! TOTP enrollment and verification, plus AES-256-GCM sealing of
//! secrets at rest.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;
use crate::secure::random_bytes;

const DIGITS: usize = 6;
const STEP_SECS: u64 = 30;
const NONCE_LEN: usize = 12;
/// Marks a stored secret as sealed; unmarked values are plain base32.
const SEALED_PREFIX: &str = "enc:";

/// Encrypt with AES-256-GCM. Returns `base64(nonce || ciphertext || tag)`.
pub fn encrypt_secret(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce_bytes = random_bytes::<NONCE_LEN>()?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM encrypt: {e}")))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

pub fn decrypt_secret(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>, AuthError> {
    let combined = STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Crypto(format!("base64 decode: {e}")))?;

    if combined.len() <= NONCE_LEN {
        return Err(AuthError::Crypto("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM decrypt: {e}")))
}

/// Prepare a base32 secret for the credential store.
pub fn seal_secret(key: Option<&[u8; 32]>, base32: &str) -> Result<String, AuthError> {
    match key {
        Some(key) => Ok(format!(
            "{SEALED_PREFIX}{}",
            encrypt_secret(key, base32.as_bytes())?
        )),
        None => Ok(base32.to_string()),
    }
}

/// Inverse of [`seal_secret`]. Plain base32 values are accepted with or
/// without a key so that enabling encryption later does not lock out
/// existing enrollments.
pub fn open_secret(key: Option<&[u8; 32]>, stored: &str) -> Result<String, AuthError> {
    let Some(sealed) = stored.strip_prefix(SEALED_PREFIX) else {
        return Ok(stored.to_string());
    };
    let key = key.ok_or_else(|| {
        AuthError::Crypto("secret is encrypted but no encryption key is configured".into())
    })?;
    let plain = decrypt_secret(key, sealed)?;
    String::from_utf8(plain).map_err(|e| AuthError::Crypto(format!("secret encoding: {e}")))
}

/// A freshly generated TOTP secret.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub secret_base32: String,
    /// `otpauth://` URI for QR-code rendering.
    pub provisioning_uri: String,
}

fn build(secret_bytes: Vec<u8>, skew: u8, issuer: &str, account: &str) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        skew,
        STEP_SECS,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))
}

fn decode_base32(secret_base32: &str) -> Result<Vec<u8>, AuthError> {
    Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret bytes: {e}")))
}

pub fn generate_enrollment(issuer: &str, account: &str) -> Result<Enrollment, AuthError> {
    let secret = Secret::generate_secret();
    let secret_bytes = secret
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret bytes: {e}")))?;

    let totp = build(secret_bytes, 1, issuer, account)?;
    Ok(Enrollment {
        secret_base32: secret.to_encoded().to_string(),
        provisioning_uri: totp.get_url(),
    })
}

/// Check `code` against the current step, accepting `skew` steps of drift.
pub fn verify_code(secret_base32: &str, code: &str, skew: u8) -> Result<bool, AuthError> {
    let code = code.trim();
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    let totp = build(decode_base32(secret_base32)?, skew, "gatekeep", "principal")?;
    totp.check_current(code)
        .map_err(|e| AuthError::Crypto(format!("TOTP check: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_code(secret_base32: &str) -> String {
        build(decode_base32(secret_base32).unwrap(), 1, "t", "t")
            .unwrap()
            .generate_current()
            .unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [42u8; 32];
        let encrypted = encrypt_secret(&key, b"totp-secret-bytes").unwrap();
        assert_eq!(decrypt_secret(&key, &encrypted).unwrap(), b"totp-secret-bytes");
    }

    #[test]
    fn wrong_key_fails_decrypt() {
        let encrypted = encrypt_secret(&[42u8; 32], b"secret").unwrap();
        assert!(decrypt_secret(&[99u8; 32], &encrypted).is_err());
    }

    #[test]
    fn sealed_secret_requires_key() {
        let key = [7u8; 32];
        let sealed = seal_secret(Some(&key), "JBSWY3DPEHPK3PXP").unwrap();
        assert!(sealed.starts_with(SEALED_PREFIX));
        assert_eq!(open_secret(Some(&key), &sealed).unwrap(), "JBSWY3DPEHPK3PXP");
        assert!(open_secret(None, &sealed).is_err());
    }

    #[test]
    fn plain_secret_passes_through() {
        assert_eq!(seal_secret(None, "ABC").unwrap(), "ABC");
        assert_eq!(open_secret(Some(&[1u8; 32]), "ABC").unwrap(), "ABC");
    }

    #[test]
    fn enrollment_produces_valid_uri() {
        let enrollment = generate_enrollment("Gatekeep", "alice@example.com").unwrap();
        assert!(!enrollment.secret_base32.is_empty());
        assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));
        assert!(enrollment.provisioning_uri.contains("Gatekeep"));
        assert!(enrollment.provisioning_uri.contains("alice"));
    }

    #[test]
    fn current_code_verifies() {
        let enrollment = generate_enrollment("Gatekeep", "bob@example.com").unwrap();
        let code = current_code(&enrollment.secret_base32);
        assert!(verify_code(&enrollment.secret_base32, &code, 1).unwrap());
    }

    #[test]
    fn malformed_codes_fail_without_error() {
        let enrollment = generate_enrollment("Gatekeep", "bob@example.com").unwrap();
        assert!(!verify_code(&enrollment.secret_base32, "", 1).unwrap());
        assert!(!verify_code(&enrollment.secret_base32, "12ab56", 1).unwrap());
        assert!(!verify_code(&enrollment.secret_base32, "1234567", 1).unwrap());
    }
}
