//! Cache entries

use super::CacheKey;
use crate::compile::DiagnosticCounts;
use crate::error::KilnResult;
use crate::store::Digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One file of a cached output tree; its bytes are stored as a blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub path: String,
    pub digest: Digest,
    #[serde(default)]
    pub executable: bool,
}

/// Result of a fully successful compile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub output_digest: Digest,
    pub diagnostic_counts: DiagnosticCounts,
    /// Listing of the output tree, so a fresh store can be repopulated
    #[serde(default)]
    pub files: Vec<CachedFile>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, output_digest: Digest, diagnostic_counts: DiagnosticCounts) -> Self {
        Self {
            key,
            output_digest,
            diagnostic_counts,
            files: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_files(mut self, files: Vec<CachedFile>) -> Self {
        self.files = files;
        self
    }

    pub fn to_bytes(&self) -> KilnResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> KilnResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Total size of the cached output files
    pub fn output_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.digest.length).sum()
    }
}

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
