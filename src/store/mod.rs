//! Content-addressed storage
//!
//! Every artifact the pipeline handles (sources, jars, scripts, compiler
//! outputs) lives in a `ContentStore` and is referred to by its tree
//! `Digest`. Trees are flat maps from relative path to file content.

mod digest;
mod memory;

pub use digest::{Digest, EMPTY_FINGERPRINT};
pub use memory::MemoryStore;

use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Abstract content store
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a single file and return the digest of the one-file tree
    async fn create_file(&self, path: &str, bytes: Vec<u8>, executable: bool) -> KilnResult<Digest>;

    /// Merge trees into one; the same path with different content is an error
    async fn merge(&self, digests: &[Digest]) -> KilnResult<Digest>;

    /// Read one file out of a tree
    async fn read_file(&self, digest: &Digest, path: &str) -> KilnResult<Option<Vec<u8>>>;

    /// List the paths in a tree, sorted
    async fn list_files(&self, digest: &Digest) -> KilnResult<Vec<String>>;

    /// Whether a path is marked executable in a tree
    async fn is_executable(&self, digest: &Digest, path: &str) -> KilnResult<bool>;

    /// A copy of a tree without the given paths
    async fn remove_paths(&self, digest: &Digest, paths: &[String]) -> KilnResult<Digest>;

    /// A copy of a tree with every path placed under `prefix`
    async fn add_prefix(&self, digest: &Digest, prefix: &str) -> KilnResult<Digest>;

    /// Whether the store holds this tree
    async fn contains(&self, digest: &Digest) -> KilnResult<bool>;
}

/// Write every file of a tree below `dir`
pub async fn materialize(store: &dyn ContentStore, digest: &Digest, dir: &Path) -> KilnResult<()> {
    for path in store.list_files(digest).await? {
        let bytes = store
            .read_file(digest, &path)
            .await?
            .ok_or_else(|| KilnError::Store(format!("{} missing from {}", path, digest)))?;
        let target = dir.join(&path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| KilnError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::write(&target, bytes)
            .await
            .map_err(|e| KilnError::io(format!("writing {}", target.display()), e))?;

        #[cfg(unix)]
        {
            if store.is_executable(digest, &path).await? {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o755);
                fs::set_permissions(&target, perms).await.map_err(|e| {
                    KilnError::io(format!("marking {} executable", target.display()), e)
                })?;
            }
        }
    }
    Ok(())
}

/// Snapshot every regular file below `dir` into a tree
///
/// Symlinks are skipped: the JDK home link created inside a sandbox must
/// never end up in an output digest.
pub async fn capture(store: &dyn ContentStore, dir: &Path) -> KilnResult<Digest> {
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];
    let mut files = Vec::new();

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current)
            .await
            .map_err(|e| KilnError::io(format!("reading {}", current.display()), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KilnError::io("reading sandbox entry", e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| KilnError::io("reading sandbox entry type", e))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();

    let mut digests = Vec::with_capacity(files.len());
    for file in files {
        let relative = file
            .strip_prefix(dir)
            .map_err(|_| KilnError::Internal(format!("{} escaped {}", file.display(), dir.display())))?
            .to_string_lossy()
            .replace('\\', "/");
        let bytes = fs::read(&file)
            .await
            .map_err(|e| KilnError::io(format!("reading {}", file.display()), e))?;
        digests.push(store.create_file(&relative, bytes, false).await?);
    }

    store.merge(&digests).await
}
