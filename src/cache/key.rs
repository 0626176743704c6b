//! Request key derivation
//!
//! A key is a pure function of `(text, mood)`: the same pair always yields the
//! same key, across calls and across processes. Text normalization is the
//! caller's responsibility; no trimming or case folding happens here.
//!
//! The 64-bit digest is what logs and status output show, but the key also
//! carries the text it was derived from and compares on both. Two texts whose
//! digests collide therefore stay distinct cache entries.

use serde::{Deserialize, Serialize};
use std::fmt;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Separates text from mood so ("ab", "c") and ("a", "bc") hash differently
const FIELD_SEPARATOR: u8 = 0x1f;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    digest: String,
    text: String,
}

impl RequestKey {
    pub fn derive(text: &str, mood: &str) -> Self {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in text
            .as_bytes()
            .iter()
            .chain(std::iter::once(&FIELD_SEPARATOR))
            .chain(mood.as_bytes())
        {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        Self {
            digest: format!("{mood}_{hash:016x}"),
            text: text.to_string(),
        }
    }

    /// Build a key with an arbitrary digest, for exercising collisions
    #[cfg(test)]
    pub(crate) fn from_parts(digest: &str, text: &str) -> Self {
        Self {
            digest: digest.to_string(),
            text: text.to_string(),
        }
    }

    /// The `{mood}_{hash}` digest
    pub fn as_str(&self) -> &str {
        &self.digest
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}
