//! In-process content store

use super::{ContentStore, Digest};
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileNode {
    content: Digest,
    executable: bool,
}

type Tree = BTreeMap<String, FileNode>;

#[derive(Default)]
struct Inner {
    blobs: HashMap<String, Arc<Vec<u8>>>,
    trees: HashMap<Digest, Arc<Tree>>,
}

/// Content store held entirely in memory
///
/// Tree digests are the sha256 of a canonical listing of
/// `(path, content fingerprint, length, executable)` rows, so two trees with
/// identical files always share a digest regardless of how they were built.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree_digest(tree: &Tree) -> Digest {
        if tree.is_empty() {
            return Digest::empty();
        }
        let mut listing = String::new();
        for (path, node) in tree {
            listing.push_str(path);
            listing.push('\0');
            listing.push_str(&node.content.fingerprint);
            listing.push('\0');
            listing.push_str(&node.content.length.to_string());
            listing.push('\0');
            listing.push(if node.executable { 'x' } else { '-' });
            listing.push('\n');
        }
        Digest::of_bytes(listing.as_bytes())
    }

    async fn insert_tree(&self, tree: Tree) -> Digest {
        let digest = Self::tree_digest(&tree);
        let mut inner = self.inner.write().await;
        inner.trees.entry(digest.clone()).or_insert_with(|| Arc::new(tree));
        digest
    }

    async fn tree(&self, digest: &Digest) -> KilnResult<Arc<Tree>> {
        if digest.is_empty() {
            return Ok(Arc::new(Tree::new()));
        }
        self.inner
            .read()
            .await
            .trees
            .get(digest)
            .cloned()
            .ok_or_else(|| KilnError::Store(format!("unknown digest {}", digest)))
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create_file(&self, path: &str, bytes: Vec<u8>, executable: bool) -> KilnResult<Digest> {
        let path = path.trim_start_matches("./");
        if path.is_empty() || path.starts_with('/') || path.split('/').any(|part| part == "..") {
            return Err(KilnError::Store(format!("invalid relative path `{}`", path)));
        }

        let content = Digest::of_bytes(&bytes);
        self.inner
            .write()
            .await
            .blobs
            .entry(content.fingerprint.clone())
            .or_insert_with(|| Arc::new(bytes));

        let mut tree = Tree::new();
        tree.insert(path.to_string(), FileNode { content, executable });
        Ok(self.insert_tree(tree).await)
    }

    async fn merge(&self, digests: &[Digest]) -> KilnResult<Digest> {
        let mut merged = Tree::new();
        for digest in digests {
            let tree = self.tree(digest).await?;
            for (path, node) in tree.iter() {
                match merged.get(path) {
                    Some(existing) if existing != node => {
                        return Err(KilnError::Store(format!(
                            "conflicting content for `{}` while merging trees",
                            path
                        )));
                    }
                    Some(_) => {}
                    None => {
                        merged.insert(path.clone(), node.clone());
                    }
                }
            }
        }
        Ok(self.insert_tree(merged).await)
    }

    async fn read_file(&self, digest: &Digest, path: &str) -> KilnResult<Option<Vec<u8>>> {
        let tree = self.tree(digest).await?;
        let Some(node) = tree.get(path) else {
            return Ok(None);
        };
        let inner = self.inner.read().await;
        let blob = inner
            .blobs
            .get(&node.content.fingerprint)
            .ok_or_else(|| KilnError::Store(format!("blob for `{}` missing", path)))?;
        Ok(Some(blob.as_ref().clone()))
    }

    async fn list_files(&self, digest: &Digest) -> KilnResult<Vec<String>> {
        Ok(self.tree(digest).await?.keys().cloned().collect())
    }

    async fn is_executable(&self, digest: &Digest, path: &str) -> KilnResult<bool> {
        Ok(self
            .tree(digest)
            .await?
            .get(path)
            .is_some_and(|node| node.executable))
    }

    async fn remove_paths(&self, digest: &Digest, paths: &[String]) -> KilnResult<Digest> {
        let mut tree = self.tree(digest).await?.as_ref().clone();
        for path in paths {
            tree.remove(path);
        }
        Ok(self.insert_tree(tree).await)
    }

    async fn add_prefix(&self, digest: &Digest, prefix: &str) -> KilnResult<Digest> {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return Ok(digest.clone());
        }
        if prefix.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(KilnError::Store(format!("invalid prefix `{}`", prefix)));
        }
        let tree: Tree = self
            .tree(digest)
            .await?
            .iter()
            .map(|(path, node)| (format!("{}/{}", prefix, path), node.clone()))
            .collect();
        Ok(self.insert_tree(tree).await)
    }

    async fn contains(&self, digest: &Digest) -> KilnResult<bool> {
        if digest.is_empty() {
            return Ok(true);
        }
        Ok(self.inner.read().await.trees.contains_key(digest))
    }
}
