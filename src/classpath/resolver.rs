//! Verified classpath resolution

use super::{Coordinate, Lockfile, LockfileEntry};
use crate::error::{KilnError, KilnResult};
use crate::memo::OnceMap;
use crate::store::{ContentStore, Digest};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Source of artifact bytes for pinned coordinates
#[async_trait]
pub trait CoordinateFetcher: Send + Sync {
    async fn fetch(&self, entry: &LockfileEntry) -> KilnResult<Vec<u8>>;
}

/// Fetcher reading `<dir>/<file_name>` for every entry
pub struct DirFetcher {
    dir: PathBuf,
}

impl DirFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl CoordinateFetcher for DirFetcher {
    async fn fetch(&self, entry: &LockfileEntry) -> KilnResult<Vec<u8>> {
        let path = self.dir.join(&entry.file_name);
        tokio::fs::read(&path).await.map_err(|e| KilnError::Fetch {
            coordinate: entry.coord.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

/// A fetched and verified classpath entry
///
/// `digest` is a one-file tree holding the artifact under `file_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedClasspathEntry {
    pub file_name: String,
    pub digest: Digest,
}

/// Resolves lockfile entries into content-store digests
///
/// Resolutions are memoized per `(coordinate, file_digest)` for the lifetime
/// of the resolver; concurrent requests for one entry share a single fetch.
pub struct ClasspathResolver {
    fetcher: Arc<dyn CoordinateFetcher>,
    store: Arc<dyn ContentStore>,
    resolved: OnceMap<(Coordinate, Digest), ResolvedClasspathEntry>,
}

impl ClasspathResolver {
    pub fn new(fetcher: Arc<dyn CoordinateFetcher>, store: Arc<dyn ContentStore>) -> Self {
        Self {
            fetcher,
            store,
            resolved: OnceMap::new(),
        }
    }

    /// Resolve one entry, verifying its content against the pinned digest
    pub async fn resolve_entry(&self, entry: &LockfileEntry) -> KilnResult<ResolvedClasspathEntry> {
        let key = (entry.coord.clone(), entry.file_digest.clone());
        self.resolved
            .get_or_compute(key, || self.fetch_and_verify(entry))
            .await
    }

    async fn fetch_and_verify(&self, entry: &LockfileEntry) -> KilnResult<ResolvedClasspathEntry> {
        debug!("Fetching {}", entry.coord);
        let bytes = self.fetcher.fetch(entry).await?;

        let actual = Digest::of_bytes(&bytes);
        if actual != entry.file_digest {
            return Err(KilnError::IntegrityViolation {
                coordinate: entry.coord.to_string(),
                expected: entry.file_digest.to_string(),
                actual: actual.to_string(),
            });
        }

        let digest = self.store.create_file(&entry.file_name, bytes, false).await?;
        info!("Resolved {} ({})", entry.coord, actual.short());
        Ok(ResolvedClasspathEntry {
            file_name: entry.file_name.clone(),
            digest,
        })
    }

    /// Resolve entries concurrently; the result keeps the input order
    pub async fn resolve(&self, entries: &[LockfileEntry]) -> KilnResult<Vec<ResolvedClasspathEntry>> {
        join_all(entries.iter().map(|entry| self.resolve_entry(entry)))
            .await
            .into_iter()
            .collect()
    }

    /// Resolve `roots` and their transitive dependencies from a lockfile
    pub async fn resolve_coordinates(
        &self,
        lockfile: &Lockfile,
        roots: &[Coordinate],
    ) -> KilnResult<Vec<ResolvedClasspathEntry>> {
        let entries = lockfile.entries_for(roots.iter())?;
        self.resolve(&entries).await
    }
}
