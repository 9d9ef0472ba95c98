//! Process execution boundary
//!
//! A `Process` is an argv run inside a sandbox materialized from an input
//! digest. Executors return the exit code, captured output streams and the
//! digest of the declared outputs.

mod local;
mod pool;

pub use local::LocalExecutor;
pub use pool::{WorkerLease, WorkerPool, POOL_BOOTSTRAP_MARKER};

use crate::error::KilnResult;
use crate::store::Digest;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// How long a result may be reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheScope {
    /// A successful result is trusted until the process restarts
    PerRestartSuccessful,
    /// Eligible for reuse across invocations
    #[default]
    Default,
}

/// One process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub argv: Vec<String>,
    pub input_digest: Digest,
    pub description: String,
    pub cache_scope: CacheScope,
    pub env: BTreeMap<String, String>,
    /// Output roots to capture, relative to the sandbox; empty captures nothing
    pub output_paths: Vec<String>,
    /// Persistent worker slot this invocation occupies, if any
    pub worker_slot: Option<usize>,
}

impl Process {
    pub fn new(argv: Vec<String>, input_digest: Digest, description: impl Into<String>) -> Self {
        Self {
            argv,
            input_digest,
            description: description.into(),
            cache_scope: CacheScope::Default,
            env: BTreeMap::new(),
            output_paths: Vec::new(),
            worker_slot: None,
        }
    }

    pub fn with_cache_scope(mut self, scope: CacheScope) -> Self {
        self.cache_scope = scope;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_output_paths(mut self, paths: Vec<String>) -> Self {
        self.output_paths = paths;
        self
    }

    pub fn with_worker_slot(mut self, slot: Option<usize>) -> Self {
        self.worker_slot = slot;
        self
    }

    /// Whether a sandbox-relative path falls under one of the output roots
    pub fn captures(&self, path: &str) -> bool {
        self.output_paths.iter().any(|root| {
            let root = root.trim_end_matches('/');
            path == root || path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Result of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub output_digest: Digest,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Abstract process executor
///
/// A non-zero exit code is a normal result, not an error; errors mean the
/// process could not be run at all.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn execute(&self, process: &Process) -> KilnResult<ProcessResult>;
}
