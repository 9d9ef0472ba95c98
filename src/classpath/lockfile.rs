//! Pinned dependency lockfile
//!
//! The lockfile is a JSON document with one entry per pinned coordinate:
//!
//! ```json
//! { "entries": [
//!     { "coord": "junit:junit:4.13.2",
//!       "file_name": "junit-4.13.2.jar",
//!       "direct_dependencies": ["org.hamcrest:hamcrest-core:1.3"],
//!       "dependencies": ["org.hamcrest:hamcrest-core:1.3"],
//!       "file_digest": { "fingerprint": "…", "serialized_bytes_length": 384581 } }
//! ] }
//! ```
//!
//! `dependencies` is the full transitive set; `direct_dependencies` is the
//! subset declared by the artifact itself.

use super::Coordinate;
use crate::error::{KilnError, KilnResult};
use crate::store::Digest;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// One pinned, content-verified dependency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockfileEntry {
    pub coord: Coordinate,
    pub file_name: String,
    #[serde(default)]
    pub direct_dependencies: BTreeSet<Coordinate>,
    #[serde(default)]
    pub dependencies: BTreeSet<Coordinate>,
    pub file_digest: Digest,
}

impl LockfileEntry {
    /// Entry with no dependency edges
    pub fn leaf(coord: Coordinate, file_name: impl Into<String>, file_digest: Digest) -> Self {
        Self {
            coord,
            file_name: file_name.into(),
            direct_dependencies: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            file_digest,
        }
    }
}

/// All pinned entries, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub entries: Vec<LockfileEntry>,
}

impl Lockfile {
    pub fn new(entries: Vec<LockfileEntry>) -> Self {
        Self { entries }
    }

    /// Load a lockfile from disk
    pub async fn load(path: &Path) -> KilnResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| KilnError::io(format!("reading lockfile {}", path.display()), e))?;
        let lockfile: Self = serde_json::from_str(&content).map_err(|e| KilnError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Loaded {} lockfile entries from {}", lockfile.entries.len(), path.display());
        Ok(lockfile)
    }

    pub fn entry(&self, coord: &Coordinate) -> Option<&LockfileEntry> {
        self.entries.iter().find(|entry| &entry.coord == coord)
    }

    /// Entries needed to put `roots` on a classpath
    ///
    /// Includes every root and its transitive dependencies, each once, in
    /// lockfile declaration order. A coordinate missing from the lockfile is
    /// an `UnpinnedCoordinate` error.
    pub fn entries_for<'a, I>(&self, roots: I) -> KilnResult<Vec<LockfileEntry>>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let index: HashMap<&Coordinate, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (&entry.coord, i))
            .collect();

        let mut wanted: HashSet<usize> = HashSet::new();
        for root in roots {
            let &i = index
                .get(root)
                .ok_or_else(|| KilnError::UnpinnedCoordinate(root.to_string()))?;
            wanted.insert(i);
            for dep in &self.entries[i].dependencies {
                let &j = index
                    .get(dep)
                    .ok_or_else(|| KilnError::UnpinnedCoordinate(dep.to_string()))?;
                wanted.insert(j);
            }
        }

        let mut order: Vec<usize> = wanted.into_iter().collect();
        order.sort_unstable();
        Ok(order.into_iter().map(|i| self.entries[i].clone()).collect())
    }
}
