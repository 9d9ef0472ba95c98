//! Content digests
//!
//! A digest is a sha256 fingerprint plus the byte length of the content it
//! identifies. Files, merged file trees and cache keys all share this shape.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Fingerprint of zero bytes of content
pub const EMPTY_FINGERPRINT: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Content identity: equal digests mean equal content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest {
    /// Lowercase hex sha256 of the content
    pub fingerprint: String,

    /// Content length in bytes
    #[serde(rename = "serialized_bytes_length")]
    pub length: u64,
}

impl Digest {
    /// Create a digest from a known fingerprint and length
    pub fn new(fingerprint: impl Into<String>, length: u64) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            length,
        }
    }

    /// Digest of a byte slice
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            fingerprint: hex::encode(hasher.finalize()),
            length: bytes.len() as u64,
        }
    }

    /// The digest of empty content (also the empty file tree)
    pub fn empty() -> Self {
        Self::new(EMPTY_FINGERPRINT, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0 && self.fingerprint == EMPTY_FINGERPRINT
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> &str {
        &self.fingerprint[..12.min(self.fingerprint.len())]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.fingerprint, self.length)
    }
}
