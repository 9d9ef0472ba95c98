//! Cache storage locations
//!
//! A location stores entries by cache key and output blobs by content
//! fingerprint. Writers always put the blobs first and the entry last, so an
//! entry that can be read refers to blobs that are already present.

use super::{CacheEntry, CacheKey};
use crate::error::{KilnError, KilnResult};
use crate::store::Digest;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// A cache read/write location
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn read_entry(&self, key: &CacheKey) -> KilnResult<Option<Vec<u8>>>;

    /// Publish an entry; readers see either nothing or the whole entry
    async fn write_entry(&self, key: &CacheKey, bytes: &[u8]) -> KilnResult<()>;

    async fn read_blob(&self, digest: &Digest) -> KilnResult<Option<Vec<u8>>>;

    async fn write_blob(&self, digest: &Digest, bytes: &[u8]) -> KilnResult<()>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}

/// Open the backend for a configured location
///
/// `http://` and `https://` locations are remote mirrors; anything else is a
/// local directory.
pub fn open_backend(location: &str) -> Arc<dyn CacheBackend> {
    match local_dir(location) {
        Some(dir) => Arc::new(DirBackend::new(dir)),
        None => Arc::new(HttpBackend::new(location)),
    }
}

/// The directory behind a local location; `None` for remote mirrors
pub fn local_dir(location: &str) -> Option<PathBuf> {
    if location.starts_with("http://") || location.starts_with("https://") {
        None
    } else {
        Some(expand_home(location))
    }
}

fn expand_home(location: &str) -> PathBuf {
    match location.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(location)),
        None => PathBuf::from(location),
    }
}

/// Cache in a local directory
///
/// Layout: `entries/<key>.json` and `blobs/<xx>/<fingerprint>`.
#[derive(Debug, Clone)]
pub struct DirBackend {
    root: PathBuf,
}

impl DirBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries_dir(&self) -> PathBuf {
        self.root.join("entries")
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.entries_dir().join(format!("{}.json", key))
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        let fp = &digest.fingerprint;
        self.root.join("blobs").join(&fp[..2.min(fp.len())]).join(fp)
    }

    async fn read_optional(path: &Path) -> KilnResult<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KilnError::io(format!("reading {}", path.display()), e)),
        }
    }

    /// Write through a temporary sibling, then rename into place
    async fn write_atomic(path: &Path, bytes: &[u8]) -> KilnResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| KilnError::Internal(format!("{} has no parent", path.display())))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| KilnError::io(format!("creating {}", parent.display()), e))?;

        let tmp = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| KilnError::io(format!("writing {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(KilnError::io(format!("publishing {}", path.display()), e));
        }
        Ok(())
    }

    /// All readable entries, newest first; unreadable ones are skipped
    pub async fn list_entries(&self) -> KilnResult<Vec<CacheEntry>> {
        let dir = self.entries_dir();
        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(KilnError::io(format!("reading {}", dir.display()), e)),
        };

        let mut entries = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| KilnError::io(format!("reading {}", dir.display()), e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match fs::read(&path).await {
                Ok(bytes) => CacheEntry::from_bytes(&bytes),
                Err(e) => Err(KilnError::io(format!("reading {}", path.display()), e)),
            };
            match parsed {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unreadable cache entry {}: {}", path.display(), e),
            }
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// Remove every entry and blob; returns the number of entries removed
    pub async fn clear(&self) -> KilnResult<usize> {
        let removed = self.list_entries().await?.len();
        for dir in [self.entries_dir(), self.root.join("blobs")] {
            match fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(KilnError::io(format!("removing {}", dir.display()), e)),
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl CacheBackend for DirBackend {
    async fn read_entry(&self, key: &CacheKey) -> KilnResult<Option<Vec<u8>>> {
        Self::read_optional(&self.entry_path(key)).await
    }

    async fn write_entry(&self, key: &CacheKey, bytes: &[u8]) -> KilnResult<()> {
        Self::write_atomic(&self.entry_path(key), bytes).await
    }

    async fn read_blob(&self, digest: &Digest) -> KilnResult<Option<Vec<u8>>> {
        Self::read_optional(&self.blob_path(digest)).await
    }

    async fn write_blob(&self, digest: &Digest, bytes: &[u8]) -> KilnResult<()> {
        let path = self.blob_path(digest);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        Self::write_atomic(&path, bytes).await
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

/// Cache on a remote HTTP mirror
///
/// Entries live at `<base>/entries/<key>.json`, blobs at
/// `<base>/blobs/<fingerprint>`; reads are `GET`, writes are `PUT`.
pub struct HttpBackend {
    base: String,
    agent: ureq::Agent,
}

impl HttpBackend {
    pub fn new(base: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build();
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn get(&self, path: String) -> KilnResult<Option<Vec<u8>>> {
        let url = self.url(&path);
        let agent = self.agent.clone();
        debug!("GET {}", url);
        tokio::task::spawn_blocking(move || match agent.get(&url).call() {
            Ok(mut response) => response
                .body_mut()
                .read_to_vec()
                .map(Some)
                .map_err(|e| backend_error(&url, e)),
            Err(ureq::Error::StatusCode(404)) => Ok(None),
            Err(e) => Err(backend_error(&url, e)),
        })
        .await
        .map_err(|e| KilnError::Internal(format!("cache request task failed: {}", e)))?
    }

    async fn put(&self, path: String, bytes: &[u8]) -> KilnResult<()> {
        let url = self.url(&path);
        let agent = self.agent.clone();
        let body = bytes.to_vec();
        debug!("PUT {} ({} bytes)", url, body.len());
        tokio::task::spawn_blocking(move || {
            agent
                .put(&url)
                .send(&body[..])
                .map(|_| ())
                .map_err(|e| backend_error(&url, e))
        })
        .await
        .map_err(|e| KilnError::Internal(format!("cache request task failed: {}", e)))?
    }
}

fn backend_error(url: &str, e: ureq::Error) -> KilnError {
    KilnError::CacheBackend {
        location: url.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl CacheBackend for HttpBackend {
    async fn read_entry(&self, key: &CacheKey) -> KilnResult<Option<Vec<u8>>> {
        self.get(format!("entries/{}.json", key)).await
    }

    async fn write_entry(&self, key: &CacheKey, bytes: &[u8]) -> KilnResult<()> {
        self.put(format!("entries/{}.json", key), bytes).await
    }

    async fn read_blob(&self, digest: &Digest) -> KilnResult<Option<Vec<u8>>> {
        self.get(format!("blobs/{}", digest.fingerprint)).await
    }

    async fn write_blob(&self, digest: &Digest, bytes: &[u8]) -> KilnResult<()> {
        self.put(format!("blobs/{}", digest.fingerprint), bytes).await
    }

    fn location(&self) -> String {
        self.base.clone()
    }
}
