//! Single-use recovery codes.
//!
//! A set is immutable: consuming a code yields a new set without it,
//! which the caller persists in place of the old one.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::{AuthError, AuthResult};
use crate::secure::random_bytes;

/// Unambiguous alphabet (no 0/O, 1/I). 32 symbols, so a byte modulo the
/// length is unbiased.
const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 12;
const GROUP_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoveryCodeSet {
    codes: Vec<String>,
}

impl RecoveryCodeSet {
    pub fn generate(count: usize) -> AuthResult<Self> {
        let codes = (0..count)
            .map(|_| generate_code())
            .collect::<AuthResult<Vec<_>>>()?;
        Ok(Self { codes })
    }

    /// Parse the stored form. `None` means no codes were ever issued.
    pub fn from_stored(stored: Option<&str>) -> AuthResult<Self> {
        match stored {
            None => Ok(Self { codes: Vec::new() }),
            Some(json) => serde_json::from_str(json)
                .map_err(|e| AuthError::Crypto(format!("malformed recovery codes: {e}"))),
        }
    }

    pub fn to_stored(&self) -> AuthResult<String> {
        serde_json::to_string(self)
            .map_err(|e| AuthError::Crypto(format!("recovery code encoding: {e}")))
    }

    /// Codes in display form (`XXXX-XXXX-XXXX`).
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Match `candidate` against every code without stopping early.
    /// Returns the remaining set on a match.
    pub fn consume(&self, candidate: &str) -> Option<Self> {
        let candidate = normalize(candidate);
        let mut matched = None;
        for (idx, code) in self.codes.iter().enumerate() {
            let hit: bool = normalize(code).as_bytes().ct_eq(candidate.as_bytes()).into();
            if hit && matched.is_none() {
                matched = Some(idx);
            }
        }

        let idx = matched?;
        let codes = self
            .codes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, code)| code.clone())
            .collect();
        Some(Self { codes })
    }
}

fn generate_code() -> AuthResult<String> {
    let bytes = random_bytes::<CODE_LEN>()?;
    let mut code = String::with_capacity(CODE_LEN + CODE_LEN / GROUP_LEN);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 && i % GROUP_LEN == 0 {
            code.push('-');
        }
        code.push(ALPHABET[usize::from(*byte) % ALPHABET.len()] as char);
    }
    Ok(code)
}

/// Uppercase and drop separators so `abcd efgh-jklm` matches.
fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
