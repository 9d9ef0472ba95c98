//! Lockfile command - verify pinned artifacts

use crate::classpath::{ClasspathResolver, DirFetcher, Lockfile};
use crate::cli::args::{LockfileAction, LockfileArgs};
use crate::error::{KilnError, KilnResult};
use crate::store::MemoryStore;
use crate::ui::{self, TaskSpinner, UiContext};
use futures_util::future::join_all;
use std::path::Path;
use std::sync::Arc;

/// Execute the lockfile command
pub async fn execute(args: LockfileArgs) -> KilnResult<()> {
    match args.action {
        LockfileAction::Verify { lockfile, dir } => verify(&lockfile, &dir).await,
    }
}

/// Verify every entry; the first failure becomes the command's error
async fn verify(lockfile_path: &Path, dir: &Path) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let lockfile = Lockfile::load(lockfile_path).await?;
    let resolver = ClasspathResolver::new(Arc::new(DirFetcher::new(dir)), Arc::new(MemoryStore::new()));

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Verifying {} pinned artifact(s)...", lockfile.entries.len()));

    let results = join_all(lockfile.entries.iter().map(|entry| resolver.resolve_entry(entry))).await;
    let failures = results.iter().filter(|r| r.is_err()).count();

    if failures == 0 {
        spinner.stop(&format!("{} artifact(s) verified", lockfile.entries.len()));
    } else {
        spinner.stop_error(&format!("{} of {} artifact(s) failed", failures, lockfile.entries.len()));
    }

    let mut first_error: Option<KilnError> = None;
    for (entry, result) in lockfile.entries.iter().zip(results) {
        match result {
            Ok(resolved) => ui::step_ok_detail(&ctx, &entry.coord.to_string(), &resolved.file_name),
            Err(e) => {
                ui::step_error_detail(&ctx, &entry.coord.to_string(), &e.to_string());
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
