//! Compile command - run a compile session over a units file

use crate::analysis::{CommandParser, DependencyAnalyzer};
use crate::cache::IncrementalCache;
use crate::classpath::{ClasspathResolver, Coordinate, DirFetcher, Lockfile};
use crate::cli::args::CompileArgs;
use crate::compile::{CompileOrchestrator, CompileOutcome, CompileRequest, CompileSession, CompileSettings};
use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::process::LocalExecutor;
use crate::run_tracker::RunTracker;
use crate::sandbox::{JdkLocator, JdkSandboxBuilder, JdkSelector};
use crate::store::{Digest, MemoryStore};
use crate::ui::{self, CompileProgress, UiContext};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// One unit as written in the units file
///
/// Source paths are relative to the units file and keep that relative form
/// inside the sandbox.
#[derive(Debug, Clone, Deserialize)]
struct UnitSpec {
    name: String,
    sources: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    coordinates: Vec<Coordinate>,
    #[serde(default)]
    option_sets: Vec<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    processors: Vec<String>,
}

/// Execute the compile command
pub async fn execute(args: CompileArgs, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let base_dir = args
        .units
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let requests = load_units(&args.units, &base_dir).await?;
    let lockfile = match &args.lockfile {
        Some(path) => Lockfile::load(path).await?,
        None => Lockfile::default(),
    };
    let settings = settings_for(&args, config)?;
    let jars = args.jars.clone().unwrap_or_else(|| base_dir.clone());

    // Interactive runs replay tracker lines once the bar is gone.
    let tracker = Arc::new(RunTracker::new(
        Some(ConfigManager::workdir(config)),
        !ctx.use_fancy_output(),
    ));
    let session = build_session(config, settings, lockfile, &jars, tracker.clone())?;

    ui::intro(&ctx, &format!("kiln compile ({} unit(s))", requests.len()));
    let progress = Arc::new(CompileProgress::new(&ctx, requests.len()));
    let hook_progress = progress.clone();
    let session = session.with_finished_hook(Arc::new(move |name, _| hook_progress.unit_done(name)));

    let results = session.compile_all(&requests).await;
    progress.finish();
    if ctx.use_fancy_output() {
        for line in tracker.lines() {
            println!("{}", line);
        }
    }
    let results = results?;

    let failed = report(&ctx, &results);
    match tracker.finish().await? {
        Some(path) => debug!("Run metadata written to {}", path.display()),
        None => debug!("Run metadata not persisted"),
    }

    if failed == 0 {
        ui::outro_success(&ctx, &format!("{} unit(s) up to date", results.len()));
        Ok(())
    } else {
        let results_len = results.len();
        ui::outro_error(&ctx, &format!("{} of {} unit(s) failed", failed, results_len));
        // Single failures keep their own message and hint.
        let first = results.into_iter().find_map(|(_, r)| r.err());
        match first {
            Some(e) if failed == 1 => Err(e),
            _ => Err(KilnError::UnitsFailed {
                failed,
                total: results_len,
            }),
        }
    }
}

/// Read the units file and every source it names
async fn load_units(path: &Path, base_dir: &Path) -> KilnResult<Vec<CompileRequest>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| KilnError::io(format!("reading units file {}", path.display()), e))?;
    let specs: Vec<UnitSpec> = serde_json::from_str(&content).map_err(|e| KilnError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut requests = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut request = CompileRequest {
            name: spec.name,
            sources: Vec::with_capacity(spec.sources.len()),
            dependencies: spec.dependencies,
            coordinates: spec.coordinates,
            option_sets: spec.option_sets,
            platform: spec.platform,
            args: spec.args,
            processors: spec.processors,
        };
        for source in spec.sources {
            let file = base_dir.join(&source);
            let bytes = fs::read(&file)
                .await
                .map_err(|e| KilnError::io(format!("reading source {}", file.display()), e))?;
            request.sources.push((source, bytes));
        }
        requests.push(request);
    }
    debug!("Loaded {} compile unit(s) from {}", requests.len(), path.display());
    Ok(requests)
}

/// Configured settings with command-line overrides applied
fn settings_for(args: &CompileArgs, config: &Config) -> KilnResult<CompileSettings> {
    let mut settings = config.compile_settings()?;
    if let Some(jdk) = &args.jdk {
        settings.jdk = JdkSelector::from(jdk.as_str());
    }
    if let Some(strategy) = args.strategy {
        settings.strategy = strategy.into();
    }
    if args.report_diagnostic_counts {
        settings.report_diagnostic_counts = true;
    }
    Ok(settings)
}

fn build_session(
    config: &Config,
    settings: CompileSettings,
    lockfile: Lockfile,
    jars: &Path,
    tracker: Arc<RunTracker>,
) -> KilnResult<CompileSession> {
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(LocalExecutor::new(store.clone()));
    let resolver = Arc::new(ClasspathResolver::new(Arc::new(DirFetcher::new(jars)), store.clone()));
    let sandboxes = Arc::new(JdkSandboxBuilder::new(
        resolver.clone(),
        executor.clone(),
        store.clone(),
        JdkLocator::new(&config.jdk.locator_exe, Digest::empty()),
        &config.jdk.shell,
    ));
    let (read_from, write_to) = ConfigManager::cache_locations(config);
    let cache = Arc::new(IncrementalCache::from_locations(store.clone(), &read_from, &write_to));

    let mut orchestrator = CompileOrchestrator::new(
        store,
        resolver,
        sandboxes,
        executor,
        cache,
        Arc::new(lockfile),
        settings,
    )?
    .with_tracker(tracker);
    if !config.analysis.parser_command.is_empty() {
        let parser = CommandParser::new(config.analysis.parser_command.clone())?;
        orchestrator = orchestrator.with_analyzer(DependencyAnalyzer::new(Arc::new(parser)));
    }

    Ok(CompileSession::new(orchestrator))
}

/// Print one line per unit; returns the number of failures
fn report(ctx: &UiContext, results: &[(String, KilnResult<CompileOutcome>)]) -> usize {
    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(outcome) if outcome.from_cache => ui::step_info(ctx, &format!("{} cached", name)),
            Ok(outcome) => {
                let detail = match outcome.rounds {
                    1 => "compiled".to_string(),
                    n => format!("compiled in {} rounds", n),
                };
                ui::step_ok_detail(ctx, name, &detail);
            }
            Err(KilnError::DependencyFailed { dependency, .. }) => {
                failed += 1;
                ui::step_blocked(ctx, name, dependency);
            }
            Err(e) => {
                failed += 1;
                ui::step_error_detail(ctx, name, &e.to_string());
                if let Some(hint) = e.hint() {
                    ui::remark(ctx, hint);
                }
            }
        }
    }
    failed
}
