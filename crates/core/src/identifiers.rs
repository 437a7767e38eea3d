//! Job tokens and masked identifiers.
//!
//! A [`JobToken`] names a job's workspace directory and is the only handle
//! clients ever hold. OS-level identifiers (process ids) are never exposed
//! verbatim; they go through the linear [`mask`] / [`unmask`] pair instead.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of characters in a generated job token.
pub const TOKEN_LENGTH: usize = 24;

/// Alphabet used for job tokens. Lowercase only so tokens are safe as
/// directory names on case-insensitive filesystems.
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

// ---------------------------------------------------------------------------
// JobToken
// ---------------------------------------------------------------------------

/// Opaque, unguessable job handle. Doubles as the workspace directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobToken(String);

impl JobToken {
    /// Generate a fresh token from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let token: String = (0..TOKEN_LENGTH)
            .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
            .collect();
        Self(token)
    }

    /// Validate a token received from a client.
    ///
    /// Only the generated alphabet and length are accepted, so a parsed token
    /// can never contain path separators or `..`.
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        let valid = raw.len() == TOKEN_LENGTH && raw.bytes().all(|b| TOKEN_ALPHABET.contains(&b));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(CodecError::InvalidToken(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobToken {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobToken {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobToken> for String {
    fn from(token: JobToken) -> Self {
        token.0
    }
}

// ---------------------------------------------------------------------------
// Masked identifiers
// ---------------------------------------------------------------------------

/// Key pair for the linear mask `masked = raw * k1 + k2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskKey {
    k1: i64,
    k2: i64,
}

/// Key used for process ids when none is configured.
pub const DEFAULT_PID_MASK: MaskKey = MaskKey {
    k1: 7919,
    k2: 104_729,
};

impl MaskKey {
    /// Build a key, rejecting `k1 == 0` (the transform would not be invertible).
    pub fn new(k1: i64, k2: i64) -> Result<Self, CodecError> {
        if k1 == 0 {
            return Err(CodecError::InvalidKey);
        }
        Ok(Self { k1, k2 })
    }

    pub fn k1(&self) -> i64 {
        self.k1
    }

    pub fn k2(&self) -> i64 {
        self.k2
    }

    pub fn mask(&self, raw: i64) -> i128 {
        raw as i128 * self.k1 as i128 + self.k2 as i128
    }

    pub fn unmask(&self, masked: i128) -> Result<i64, CodecError> {
        let shifted = masked - self.k2 as i128;
        let k1 = self.k1 as i128;
        if shifted % k1 != 0 {
            return Err(CodecError::InvalidMaskedValue(masked));
        }
        i64::try_from(shifted / k1).map_err(|_| CodecError::InvalidMaskedValue(masked))
    }
}

/// Mask `raw` with keys `k1`, `k2`.
///
/// Computed in `i128` so every `i64` input maps without overflow.
pub fn mask(raw: i64, k1: i64, k2: i64) -> Result<i128, CodecError> {
    Ok(MaskKey::new(k1, k2)?.mask(raw))
}

/// Invert [`mask`]. Fails on `k1 == 0` or on values outside the image of the key.
pub fn unmask(masked: i128, k1: i64, k2: i64) -> Result<i64, CodecError> {
    MaskKey::new(k1, k2)?.unmask(masked)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
