//! Password hashing and verification using Argon2id.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};

use crate::error::AuthError;
use crate::secure::random_bytes;

/// OWASP-recommended Argon2id parameters (19 MiB, 2 passes, 1 lane).
fn argon2() -> Result<Argon2<'static>, AuthError> {
    let params = Params::new(19 * 1024, 2, 1, None)
        .map_err(|e| AuthError::Crypto(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Well-formed hash with the production cost parameters that no
/// password matches.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$Z2F0ZWtlZXAtZHVtbXkhIQ$\
                          BwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSY";

fn peppered(password: &str, pepper: Option<&str>) -> Vec<u8> {
    match pepper {
        Some(p) => format!("{p}{password}").into_bytes(),
        None => password.as_bytes().to_vec(),
    }
}

/// Hash a password into PHC string format.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(&random_bytes::<16>()?)
        .map_err(|e| AuthError::Crypto(format!("salt encoding: {e}")))?;
    argon2()?
        .hash_password(&peppered(password, pepper), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Crypto(format!("password hashing: {e}")))
}

/// Verify a plaintext password against a PHC-format hash.
///
/// Returns `Ok(false)` on mismatch and `Err(AuthError::Crypto)` if the
/// stored hash is malformed. Parameters are read from the hash itself.
pub fn verify_password(
    password: &str,
    hash: &str,
    pepper: Option<&str>,
) -> Result<bool, AuthError> {
    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(&peppered(password, pepper), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}

/// Spend the work of one real verification without a stored hash, so an
/// unknown login costs the same as a wrong password.
pub fn verify_dummy(password: &str, pepper: Option<&str>) -> Result<(), AuthError> {
    verify_password(password, DUMMY_HASH, pepper).map(|_| ())
}
