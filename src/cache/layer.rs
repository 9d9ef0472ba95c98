//! Incremental compile cache

use super::{open_backend, CacheBackend, CacheEntry, CacheKey, CachedFile, CompileUnit};
use crate::compile::DiagnosticCounts;
use crate::error::{KilnError, KilnResult};
use crate::store::{ContentStore, Digest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Compile results keyed by `CompileUnit`
///
/// Entries recorded during this process are kept in memory; configured read
/// locations are consulted in order after that, and every configured write
/// location receives each new entry. Anything unreadable is a miss.
pub struct IncrementalCache {
    store: Arc<dyn ContentStore>,
    memory: Mutex<HashMap<CacheKey, CacheEntry>>,
    read_from: Vec<Arc<dyn CacheBackend>>,
    write_to: Vec<Arc<dyn CacheBackend>>,
}

impl IncrementalCache {
    /// A cache that only remembers results from this process
    pub fn in_memory(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            memory: Mutex::new(HashMap::new()),
            read_from: Vec::new(),
            write_to: Vec::new(),
        }
    }

    pub fn with_backends(
        store: Arc<dyn ContentStore>,
        read_from: Vec<Arc<dyn CacheBackend>>,
        write_to: Vec<Arc<dyn CacheBackend>>,
    ) -> Self {
        Self {
            read_from,
            write_to,
            ..Self::in_memory(store)
        }
    }

    /// Open the configured locations
    pub fn from_locations(store: Arc<dyn ContentStore>, read_from: &[String], write_to: &[String]) -> Self {
        Self::with_backends(
            store,
            read_from.iter().map(|l| open_backend(l)).collect(),
            write_to.iter().map(|l| open_backend(l)).collect(),
        )
    }

    fn memory(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The stored result for `unit`, if a usable one exists
    pub async fn lookup(&self, unit: &CompileUnit) -> Option<CacheEntry> {
        let key = unit.key();
        let remembered = self.memory().get(&key).cloned();
        if let Some(entry) = remembered {
            if self.store.contains(&entry.output_digest).await.unwrap_or(false) {
                debug!("Cache hit for {} (this run)", key);
                return Some(entry);
            }
        }

        for backend in &self.read_from {
            match self.read_from_backend(backend.as_ref(), &key).await {
                Ok(Some(entry)) => {
                    info!("Cache hit for {} at {}", key, backend.location());
                    self.memory().insert(key, entry.clone());
                    return Some(entry);
                }
                Ok(None) => {}
                Err(e) => warn!("Treating cache entry {} at {} as a miss: {}", key, backend.location(), e),
            }
        }

        debug!("Cache miss for {}", key);
        None
    }

    async fn read_from_backend(&self, backend: &dyn CacheBackend, key: &CacheKey) -> KilnResult<Option<CacheEntry>> {
        let Some(bytes) = backend.read_entry(key).await? else {
            return Ok(None);
        };
        let entry = CacheEntry::from_bytes(&bytes)?;
        if &entry.key != key {
            return Err(KilnError::CacheBackend {
                location: backend.location(),
                reason: format!("entry is for key {}", entry.key),
            });
        }

        if !self.store.contains(&entry.output_digest).await? {
            self.restore_outputs(backend, &entry).await?;
        }
        Ok(Some(entry))
    }

    /// Repopulate the content store from an entry's blobs
    async fn restore_outputs(&self, backend: &dyn CacheBackend, entry: &CacheEntry) -> KilnResult<()> {
        let mut digests = Vec::with_capacity(entry.files.len());
        for file in &entry.files {
            let bytes = backend
                .read_blob(&file.digest)
                .await?
                .ok_or_else(|| KilnError::CacheBackend {
                    location: backend.location(),
                    reason: format!("blob for {} missing", file.path),
                })?;
            if Digest::of_bytes(&bytes) != file.digest {
                return Err(KilnError::CacheBackend {
                    location: backend.location(),
                    reason: format!("blob for {} is corrupt", file.path),
                });
            }
            digests.push(self.store.create_file(&file.path, bytes, file.executable).await?);
        }

        let restored = self.store.merge(&digests).await?;
        if restored != entry.output_digest {
            return Err(KilnError::CacheBackend {
                location: backend.location(),
                reason: "restored outputs do not match the entry digest".to_string(),
            });
        }
        Ok(())
    }

    /// Record a successful compile
    ///
    /// Failing to publish to a write location is logged, not returned: the
    /// compile itself already succeeded.
    pub async fn store(
        &self,
        unit: &CompileUnit,
        output_digest: &Digest,
        diagnostic_counts: DiagnosticCounts,
    ) -> KilnResult<CacheEntry> {
        let key = unit.key();
        let mut files = Vec::new();
        let mut blobs = Vec::new();
        for path in self.store.list_files(output_digest).await? {
            let bytes = self
                .store
                .read_file(output_digest, &path)
                .await?
                .ok_or_else(|| KilnError::Store(format!("{} missing from {}", path, output_digest)))?;
            let executable = self.store.is_executable(output_digest, &path).await?;
            let digest = Digest::of_bytes(&bytes);
            files.push(CachedFile {
                path,
                digest: digest.clone(),
                executable,
            });
            blobs.push((digest, bytes));
        }

        let entry = CacheEntry::new(key.clone(), output_digest.clone(), diagnostic_counts).with_files(files);
        if !self.write_to.is_empty() {
            let bytes = entry.to_bytes()?;
            for backend in &self.write_to {
                if let Err(e) = Self::publish(backend.as_ref(), &key, &blobs, &bytes).await {
                    warn!("Failed to write cache entry {} to {}: {}", key, backend.location(), e);
                }
            }
        }

        self.memory().insert(key, entry.clone());
        Ok(entry)
    }

    async fn publish(
        backend: &dyn CacheBackend,
        key: &CacheKey,
        blobs: &[(Digest, Vec<u8>)],
        entry: &[u8],
    ) -> KilnResult<()> {
        for (digest, bytes) in blobs {
            backend.write_blob(digest, bytes).await?;
        }
        backend.write_entry(key, entry).await?;
        debug!("Wrote cache entry {} to {}", key, backend.location());
        Ok(())
    }

    /// Number of entries remembered by this process
    pub fn len(&self) -> usize {
        self.memory().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
