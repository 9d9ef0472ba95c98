//! Run metadata
//!
//! Collects the user-facing lines a run emits and per-unit `target_data`,
//! and persists them under `<workdir>/run-tracker/<run-id>/info`. The newest
//! run is mirrored to `<workdir>/run-tracker/latest/info`.

use crate::error::{KilnError, KilnResult};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, warn};

/// Records one run
pub struct RunTracker {
    run_id: String,
    workdir: Option<PathBuf>,
    echo: bool,
    started_at: DateTime<Utc>,
    lines: Mutex<Vec<String>>,
    target_data: Mutex<BTreeMap<String, Map<String, Value>>>,
}

impl RunTracker {
    /// Tracker persisting under `workdir`, printing lines when `echo` is set
    pub fn new(workdir: Option<PathBuf>, echo: bool) -> Self {
        Self {
            run_id: format!("kiln_run_{}", uuid::Uuid::new_v4().simple()),
            workdir,
            echo,
            started_at: Utc::now(),
            lines: Mutex::new(Vec::new()),
            target_data: Mutex::new(BTreeMap::new()),
        }
    }

    /// Tracker that neither prints nor persists
    pub fn quiet() -> Self {
        Self::new(None, false)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Emit a user-facing line
    pub fn emit(&self, line: impl Into<String>) {
        let line = line.into();
        if self.echo {
            println!("{}", line);
        }
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }

    /// Every line emitted so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether any emitted line contains `needle`
    pub fn output_contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|line| line.contains(needle))
    }

    /// Attach a value to a unit's target data
    pub fn record_target_data(&self, unit: &str, key: &str, value: Value) {
        self.target_data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(unit.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn target_data(&self, unit: &str) -> Option<Value> {
        self.target_data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(unit)
            .map(|data| Value::Object(data.clone()))
    }

    fn info(&self, finished_at: DateTime<Utc>) -> KilnResult<String> {
        let target_data = {
            let data = self.target_data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let map: Map<String, Value> = data
                .iter()
                .map(|(unit, values)| (unit.clone(), Value::Object(values.clone())))
                .collect();
            serde_json::to_string(&Value::Object(map))?
        };
        Ok(format!(
            "id: {}\nstarted_at: {}\nfinished_at: {}\ntarget_data: {}\n",
            self.run_id,
            self.started_at.to_rfc3339(),
            finished_at.to_rfc3339(),
            target_data
        ))
    }

    /// Persist the run; returns the info path, or `None` without a workdir
    pub async fn finish(&self) -> KilnResult<Option<PathBuf>> {
        let Some(workdir) = &self.workdir else {
            return Ok(None);
        };
        let info = self.info(Utc::now())?;
        let root = workdir.join("run-tracker");

        let run_info = root.join(&self.run_id).join("info");
        write_file(&run_info, &info).await?;

        // The latest mirror is best-effort; the run's own record is what counts.
        if let Err(e) = write_file(&root.join("latest").join("info"), &info).await {
            warn!("Failed to refresh latest run info: {}", e);
        }
        debug!("Run info written to {}", run_info.display());
        Ok(Some(run_info))
    }
}

async fn write_file(path: &Path, content: &str) -> KilnResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| KilnError::Internal(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|e| KilnError::io(format!("creating {}", parent.display()), e))?;
    let tmp = parent.join(format!(".info.{}.tmp", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, content)
        .await
        .map_err(|e| KilnError::io(format!("writing {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| KilnError::io(format!("writing {}", path.display()), e))
}
