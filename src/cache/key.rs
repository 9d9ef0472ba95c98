//! Compile cache keys
//!
//! A `CompileUnit` is everything that determines a compile's output. Its key
//! is a sha256 over a tagged, length-delimited encoding of every field, so no
//! two distinct units can collide by shifting bytes between fields.

use crate::store::Digest;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// JVM language level a unit is compiled for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub source_version: String,
    pub target_version: String,
}

impl Platform {
    pub fn new(source_version: impl Into<String>, target_version: impl Into<String>) -> Self {
        Self {
            source_version: source_version.into(),
            target_version: target_version.into(),
        }
    }
}

/// The inputs that determine a compile's output
///
/// Classpath digests identify the binary content of each dependency, so a
/// dependency that recompiles to different bytecode changes every key
/// downstream of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompileUnit {
    pub source_digest: Digest,
    pub classpath_digests: Vec<Digest>,
    pub compiler_options: Vec<String>,
    pub platform: Option<Platform>,
}

/// Content fingerprint of a `CompileUnit`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept an existing key string, such as a cache file stem
    pub fn parse(s: &str) -> Option<Self> {
        (s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())).then(|| Self(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct KeyHasher {
    hasher: Sha256,
}

impl KeyHasher {
    fn new() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"kiln-compile-unit:v1");
        Self { hasher }
    }

    fn field(&mut self, tag: u8, bytes: &[u8]) -> &mut Self {
        self.hasher.update([tag]);
        self.hasher.update((bytes.len() as u64).to_be_bytes());
        self.hasher.update(bytes);
        self
    }

    fn digest(&mut self, tag: u8, digest: &Digest) -> &mut Self {
        self.field(tag, digest.fingerprint.as_bytes());
        self.hasher.update(digest.length.to_be_bytes());
        self
    }

    fn count(&mut self, tag: u8, n: usize) -> &mut Self {
        self.field(tag, &(n as u64).to_be_bytes())
    }

    fn finish(self) -> CacheKey {
        CacheKey(hex::encode(self.hasher.finalize()))
    }
}

impl CompileUnit {
    pub fn key(&self) -> CacheKey {
        let mut h = KeyHasher::new();
        h.digest(b's', &self.source_digest);

        h.count(b'C', self.classpath_digests.len());
        for digest in &self.classpath_digests {
            h.digest(b'c', digest);
        }

        h.count(b'O', self.compiler_options.len());
        for option in &self.compiler_options {
            h.field(b'o', option.as_bytes());
        }

        match &self.platform {
            Some(platform) => {
                h.field(b'p', platform.source_version.as_bytes());
                h.field(b't', platform.target_version.as_bytes());
            }
            None => {
                h.field(b'-', &[]);
            }
        }
        h.finish()
    }
}
