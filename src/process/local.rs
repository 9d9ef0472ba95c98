//! Executor running processes on the local machine

use super::{CacheScope, Process, ProcessExecutor, ProcessResult};
use crate::error::{KilnError, KilnResult};
use crate::store::{self, ContentStore, Digest};
use async_trait::async_trait;
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

/// Runs each process in a fresh temporary directory
///
/// The directory is populated from the input digest; after the process exits
/// the declared output roots are captured back into the store.
pub struct LocalExecutor {
    store: Arc<dyn ContentStore>,
    restart_cache: Mutex<HashMap<String, ProcessResult>>,
}

impl LocalExecutor {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            restart_cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(process: &Process) -> String {
        let mut hasher = Sha256::new();
        for arg in &process.argv {
            hasher.update(arg.as_bytes());
            hasher.update([0]);
        }
        hasher.update(process.input_digest.to_string().as_bytes());
        for (key, value) in &process.env {
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
            hasher.update([0]);
        }
        for path in &process.output_paths {
            hasher.update(path.as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }

    fn cached(&self, key: &str) -> Option<ProcessResult> {
        self.restart_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    async fn run(&self, process: &Process) -> KilnResult<ProcessResult> {
        let (program, args) = process
            .argv
            .split_first()
            .ok_or_else(|| KilnError::process(&process.description, "empty argv"))?;

        let sandbox = TempDir::new().map_err(|e| KilnError::io("creating sandbox directory", e))?;
        store::materialize(self.store.as_ref(), &process.input_digest, sandbox.path()).await?;

        debug!("Executing: {} ({:?})", process.description, process.argv);
        if let Some(slot) = process.worker_slot {
            debug!("Running on worker slot {}", slot);
        }

        let output = Command::new(program)
            .args(args)
            .current_dir(sandbox.path())
            .envs(&process.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| KilnError::process(&process.description, e.to_string()))?;

        let output_digest = if process.output_paths.is_empty() {
            Digest::empty()
        } else {
            let captured = store::capture(self.store.as_ref(), sandbox.path()).await?;
            let excluded: Vec<String> = self
                .store
                .list_files(&captured)
                .await?
                .into_iter()
                .filter(|path| !process.captures(path))
                .collect();
            self.store.remove_paths(&captured, &excluded).await?
        };

        Ok(ProcessResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
            output_digest,
        })
    }
}

#[async_trait]
impl ProcessExecutor for LocalExecutor {
    async fn execute(&self, process: &Process) -> KilnResult<ProcessResult> {
        if process.cache_scope != CacheScope::PerRestartSuccessful {
            return self.run(process).await;
        }

        let key = Self::cache_key(process);
        if let Some(result) = self.cached(&key) {
            debug!("Reusing result of {} from this run", process.description);
            return Ok(result);
        }

        let result = self.run(process).await?;
        if result.success() {
            self.restart_cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(key, result.clone());
        }
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn runs_in_materialized_sandbox() {
        let store = Arc::new(MemoryStore::new());
        let input = store.create_file("in.txt", b"hello".to_vec(), false).await.unwrap();
        let executor = LocalExecutor::new(store.clone());

        let process = Process::new(
            sh("mkdir out && cat in.txt > out/copy.txt && echo done"),
            input,
            "copy input",
        )
        .with_output_paths(vec!["out".into()]);
        let result = executor.execute(&process).await.unwrap();

        assert!(result.success());
        assert_eq!(result.stdout_lossy().trim(), "done");
        assert_eq!(store.list_files(&result.output_digest).await.unwrap(), vec!["out/copy.txt"]);
        assert_eq!(
            store.read_file(&result.output_digest, "out/copy.txt").await.unwrap(),
            Some(b"hello".to_vec())
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_result() {
        let store = Arc::new(MemoryStore::new());
        let executor = LocalExecutor::new(store);

        let result = executor
            .execute(&Process::new(sh("echo broken >&2; exit 3"), Digest::empty(), "fail"))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr_lossy().trim(), "broken");
    }

    #[tokio::test]
    async fn per_restart_scope_caches_only_successes() {
        let store = Arc::new(MemoryStore::new());
        let executor = LocalExecutor::new(store);
        let marker = TempDir::new().unwrap();
        let counter = marker.path().join("count");

        let script = format!("echo x >> {}", counter.display());
        let ok = Process::new(sh(&script), Digest::empty(), "count")
            .with_cache_scope(CacheScope::PerRestartSuccessful);
        executor.execute(&ok).await.unwrap();
        executor.execute(&ok).await.unwrap();
        assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 1);

        let script = format!("echo x >> {}; exit 1", counter.display());
        let failing = Process::new(sh(&script), Digest::empty(), "count and fail")
            .with_cache_scope(CacheScope::PerRestartSuccessful);
        executor.execute(&failing).await.unwrap();
        executor.execute(&failing).await.unwrap();
        assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn empty_argv_is_an_error() {
        let executor = LocalExecutor::new(Arc::new(MemoryStore::new()));
        let err = executor
            .execute(&Process::new(vec![], Digest::empty(), "nothing"))
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::Process { .. }));
    }
}
