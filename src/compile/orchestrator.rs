//! Drives one compile unit from analysis to a finished (or failed) output

use super::diagnostics::{render, DiagnosticCounts, LoggerStyle};
use super::options::OptionSettings;
use super::round::{RoundReport, ROUND_REPORT};
use super::state::{UnitProgress, UnitState};
use crate::analysis::{is_java_source, DependencyAnalyzer, FileAnalysis};
use crate::cache::{CompileUnit, IncrementalCache};
use crate::classpath::{ClasspathResolver, Coordinate, Lockfile, LockfileEntry, ResolvedClasspathEntry};
use crate::error::{KilnError, KilnResult};
use crate::process::{Process, ProcessExecutor, ProcessResult, WorkerLease, WorkerPool, POOL_BOOTSTRAP_MARKER};
use crate::run_tracker::RunTracker;
use crate::sandbox::{default_persistent_server, JdkSandbox, JdkSandboxBuilder, JdkSelector};
use crate::store::{ContentStore, Digest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Directory compiled classes are written to inside the sandbox
pub const CLASSES_DIR: &str = "classes";

/// Directory annotation processors write generated sources to
pub const GENERATED_DIR: &str = "generated";

/// Annotation processing that keeps producing new sources past this many
/// rounds is treated as a failure
pub const MAX_ROUNDS: usize = 32;

/// How compiler processes are run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Reuse long-lived compiler workers across invocations
    #[default]
    Persistent,
    /// A fresh process for every invocation
    Hermetic,
}

/// Settings shared by every unit of a session
#[derive(Debug, Clone)]
pub struct CompileSettings {
    pub jdk: JdkSelector,
    pub persistent_server: LockfileEntry,
    pub strategy: ExecutionStrategy,
    pub incremental: bool,
    pub worker_pool_size: usize,
    pub timeout: Option<Duration>,
    pub options: OptionSettings,
    pub report_diagnostic_counts: bool,
    pub logger: LoggerStyle,
    pub compiler_main: String,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            jdk: JdkSelector::System,
            persistent_server: default_persistent_server(),
            strategy: ExecutionStrategy::default(),
            incremental: true,
            worker_pool_size: 4,
            timeout: None,
            options: OptionSettings::default(),
            report_diagnostic_counts: false,
            logger: LoggerStyle::default(),
            compiler_main: "com.sun.tools.javac.Main".to_string(),
        }
    }
}

impl CompileSettings {
    /// Strategy actually used; turning incremental mode off forces hermetic runs
    pub fn effective_strategy(&self) -> ExecutionStrategy {
        if self.incremental {
            self.strategy
        } else {
            ExecutionStrategy::Hermetic
        }
    }
}

/// One compile unit
#[derive(Debug, Clone, Default)]
pub struct CompileRequest {
    pub name: String,
    /// `(relative path, content)` pairs
    pub sources: Vec<(String, Vec<u8>)>,
    /// Names of units whose outputs this unit compiles against
    pub dependencies: Vec<String>,
    /// Third-party roots, resolved transitively through the lockfile
    pub coordinates: Vec<Coordinate>,
    pub option_sets: Vec<String>,
    pub platform: Option<String>,
    pub args: Vec<String>,
    /// Annotation processor classes for this unit only
    pub processors: Vec<String>,
}

impl CompileRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.sources.push((path.into(), content.into()));
        self
    }

    pub fn with_dependency(mut self, unit: impl Into<String>) -> Self {
        self.dependencies.push(unit.into());
        self
    }

    pub fn with_coordinate(mut self, coord: Coordinate) -> Self {
        self.coordinates.push(coord);
        self
    }

    pub fn with_option_set(mut self, name: impl Into<String>) -> Self {
        self.option_sets.push(name.into());
        self
    }

    pub fn with_platform(mut self, name: impl Into<String>) -> Self {
        self.platform = Some(name.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_processor(mut self, class: impl Into<String>) -> Self {
        self.processors.push(class.into());
        self
    }
}

/// A finished compile
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub unit: String,
    /// Compiled classes under `classes/` and generated sources under `generated/`
    pub output_digest: Digest,
    pub diagnostic_counts: DiagnosticCounts,
    pub from_cache: bool,
    pub rounds: usize,
    pub analyses: Vec<FileAnalysis>,
    pub progress: UnitProgress,
}

/// Everything one unit needs before its first round
struct Prepared {
    sandbox: JdkSandbox,
    classpath: Vec<ResolvedClasspathEntry>,
    analyses: Vec<FileAnalysis>,
}

/// Runs compile units against shared resolvers, sandboxes, workers and cache
pub struct CompileOrchestrator {
    store: Arc<dyn ContentStore>,
    analyzer: Option<DependencyAnalyzer>,
    resolver: Arc<ClasspathResolver>,
    sandboxes: Arc<JdkSandboxBuilder>,
    executor: Arc<dyn ProcessExecutor>,
    cache: Arc<IncrementalCache>,
    pool: WorkerPool,
    tracker: Arc<RunTracker>,
    lockfile: Arc<Lockfile>,
    settings: CompileSettings,
}

impl CompileOrchestrator {
    /// Create an orchestrator, rejecting invalid option settings up front
    pub fn new(
        store: Arc<dyn ContentStore>,
        resolver: Arc<ClasspathResolver>,
        sandboxes: Arc<JdkSandboxBuilder>,
        executor: Arc<dyn ProcessExecutor>,
        cache: Arc<IncrementalCache>,
        lockfile: Arc<Lockfile>,
        settings: CompileSettings,
    ) -> KilnResult<Self> {
        settings.options.validate()?;
        Ok(Self {
            store,
            analyzer: None,
            resolver,
            sandboxes,
            executor,
            cache,
            pool: WorkerPool::new(settings.worker_pool_size),
            tracker: Arc::new(RunTracker::quiet()),
            lockfile,
            settings,
        })
    }

    pub fn with_analyzer(mut self, analyzer: DependencyAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<RunTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn settings(&self) -> &CompileSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &Arc<RunTracker> {
        &self.tracker
    }

    pub fn cache(&self) -> &Arc<IncrementalCache> {
        &self.cache
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Compile `request` against the finished outputs of its dependencies
    ///
    /// `upstream` holds the outcomes of every unit `request` depends on,
    /// transitively, in classpath order.
    pub async fn compile(&self, request: &CompileRequest, upstream: &[CompileOutcome]) -> KilnResult<CompileOutcome> {
        let mut progress = UnitProgress::new(&request.name);
        match self.run(request, upstream, &mut progress).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let e = progress.fail(e);
                debug!("{}: {}", request.name, progress.trail().join(" -> "));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &CompileRequest,
        upstream: &[CompileOutcome],
        progress: &mut UnitProgress,
    ) -> KilnResult<CompileOutcome> {
        let unit_name = request.name.as_str();

        // Option and platform errors surface before anything runs.
        let built = self.settings.options.compiler_args(
            &request.args,
            &request.option_sets,
            request.platform.as_deref(),
        )?;
        for warning in &built.warnings {
            warn!("{}: {}", unit_name, warning);
            self.tracker.emit(format!("[warn] {}", warning));
        }
        let mut args = built.args;
        if !request.processors.is_empty() {
            args.push("-processor".to_string());
            args.push(request.processors.join(","));
        }

        progress.advance(UnitState::Analyzing)?;
        let prepared = self.prepare(request).await?;
        progress.advance(UnitState::ClasspathReady)?;
        progress.advance(UnitState::SandboxReady)?;

        let source_digest = self.source_digest(&request.sources).await?;
        let mut classpath_digests: Vec<Digest> = prepared.classpath.iter().map(|e| e.digest.clone()).collect();
        classpath_digests.extend(upstream.iter().map(|o| o.output_digest.clone()));

        let mut compiler_options = args.clone();
        compiler_options.push(format!("main:{}", self.settings.compiler_main));
        compiler_options.push(format!("jdk:{}", self.settings.jdk));
        compiler_options.push(format!("sandbox:{}", prepared.sandbox.digest));
        let unit = CompileUnit {
            source_digest: source_digest.clone(),
            classpath_digests,
            compiler_options,
            platform: built.platform,
        };

        if let Some(entry) = self.cache.lookup(&unit).await {
            info!("{}: cache hit ({})", unit_name, entry.key);
            self.report_counts(unit_name, &entry.diagnostic_counts);
            progress.advance(UnitState::Succeeded {
                output_digest: entry.output_digest.clone(),
                diagnostic_counts: entry.diagnostic_counts,
                from_cache: true,
            })?;
            return Ok(CompileOutcome {
                unit: unit_name.to_string(),
                output_digest: entry.output_digest,
                diagnostic_counts: entry.diagnostic_counts,
                from_cache: true,
                rounds: 0,
                analyses: prepared.analyses,
                progress: progress.clone(),
            });
        }

        let (output_digest, counts) = self
            .execute_rounds(request, upstream, &prepared, &source_digest, &args, progress)
            .await?;

        self.report_counts(unit_name, &counts);
        self.cache.store(&unit, &output_digest, counts).await?;
        progress.advance(UnitState::Succeeded {
            output_digest: output_digest.clone(),
            diagnostic_counts: counts,
            from_cache: false,
        })?;
        info!("{}: compiled in {} round(s)", unit_name, progress.rounds());

        Ok(CompileOutcome {
            unit: unit_name.to_string(),
            output_digest,
            diagnostic_counts: counts,
            from_cache: false,
            rounds: progress.rounds(),
            analyses: prepared.analyses,
            progress: progress.clone(),
        })
    }

    /// Analysis, classpath resolution and sandbox preparation, concurrently
    async fn prepare(&self, request: &CompileRequest) -> KilnResult<Prepared> {
        let analysis = async {
            match &self.analyzer {
                Some(analyzer) => {
                    let java: Vec<(String, Vec<u8>)> = request
                        .sources
                        .iter()
                        .filter(|(path, _)| is_java_source(path))
                        .cloned()
                        .collect();
                    analyzer.analyze_all(&java).await
                }
                None => Vec::new(),
            }
        };
        let classpath = self
            .resolver
            .resolve_coordinates(&self.lockfile, &request.coordinates);
        let sandbox = self
            .sandboxes
            .prepare(&self.settings.jdk, &self.settings.persistent_server);

        let (analyses, classpath, sandbox) = tokio::join!(analysis, classpath, sandbox);
        let classpath = classpath?;
        let sandbox = sandbox?;
        Ok(Prepared {
            sandbox,
            classpath,
            analyses,
        })
    }

    async fn source_digest(&self, sources: &[(String, Vec<u8>)]) -> KilnResult<Digest> {
        let mut digests = Vec::with_capacity(sources.len());
        for (path, content) in sources {
            digests.push(self.store.create_file(path, content.clone(), false).await?);
        }
        self.store.merge(&digests).await
    }

    async fn execute_rounds(
        &self,
        request: &CompileRequest,
        upstream: &[CompileOutcome],
        prepared: &Prepared,
        source_digest: &Digest,
        args: &[String],
        progress: &mut UnitProgress,
    ) -> KilnResult<(Digest, DiagnosticCounts)> {
        let mut base_inputs = vec![prepared.sandbox.digest.clone(), source_digest.clone()];
        let mut classpath: Vec<String> = Vec::new();
        for entry in &prepared.classpath {
            base_inputs.push(entry.digest.clone());
            classpath.push(entry.file_name.clone());
        }
        for (index, outcome) in upstream.iter().enumerate() {
            let prefix = format!("deps/{}-{}", index, sanitize(&outcome.unit));
            base_inputs.push(self.store.add_prefix(&outcome.output_digest, &prefix).await?);
            classpath.push(format!("{}/{}", prefix, CLASSES_DIR));
        }

        let mut compiled: BTreeSet<String> = request.sources.iter().map(|(path, _)| path.clone()).collect();
        let mut round_sources: Vec<String> = request.sources.iter().map(|(path, _)| path.clone()).collect();
        let mut round_outputs: Vec<Digest> = Vec::new();
        let mut counts = DiagnosticCounts::default();
        let mut round = 1;
        progress.advance(UnitState::Executing { round })?;

        loop {
            let mut inputs = base_inputs.clone();
            inputs.extend(round_outputs.iter().cloned());
            let input_digest = self.store.merge(&inputs).await?;

            let mut round_classpath = classpath.clone();
            if round > 1 {
                round_classpath.insert(0, CLASSES_DIR.to_string());
            }
            let process = self.compiler_process(request, &prepared.sandbox, args, &round_classpath, &round_sources, input_digest, round);
            let result = self.execute(&request.name, &prepared.sandbox, process).await?;

            let report = RoundReport::from_output(
                self.store.as_ref(),
                &result.output_digest,
                &result.stdout_lossy(),
                &result.stderr_lossy(),
            )
            .await?;
            for line in render(&report.diagnostics, self.settings.logger) {
                self.tracker.emit(line);
            }
            counts += DiagnosticCounts::of(&report.diagnostics);

            if !result.success() {
                self.report_counts(&request.name, &counts);
                return Err(KilnError::CompileFailure {
                    unit: request.name.clone(),
                    exit_code: result.exit_code,
                    stderr: result.stderr_lossy(),
                });
            }

            round_outputs.push(
                self.store
                    .remove_paths(&result.output_digest, &[ROUND_REPORT.to_string()])
                    .await?,
            );

            let generated: Vec<String> = report
                .generated_sources
                .into_iter()
                .filter(|path| compiled.insert(path.clone()))
                .collect();
            if generated.is_empty() {
                break;
            }
            if round >= MAX_ROUNDS {
                return Err(KilnError::process(
                    request.name.clone(),
                    format!("annotation processing still generating sources after {} rounds", MAX_ROUNDS),
                ));
            }

            debug!("{}: round {} generated {:?}", request.name, round, generated);
            progress.advance(UnitState::AwaitingNextRound {
                round,
                generated_sources: generated.clone(),
            })?;
            round += 1;
            progress.advance(UnitState::Executing { round })?;
            round_sources = generated;
        }

        let output = self.store.merge(&round_outputs).await?;
        Ok((output, counts))
    }

    #[allow(clippy::too_many_arguments)]
    fn compiler_process(
        &self,
        request: &CompileRequest,
        sandbox: &JdkSandbox,
        args: &[String],
        classpath: &[String],
        sources: &[String],
        input_digest: Digest,
        round: usize,
    ) -> Process {
        let mut argv = sandbox.args::<&str>(self.sandboxes.shell(), &[]);
        argv.push(self.settings.compiler_main.clone());
        argv.extend(args.iter().cloned());
        argv.extend([
            "-d".to_string(),
            CLASSES_DIR.to_string(),
            "-s".to_string(),
            GENERATED_DIR.to_string(),
        ]);
        if !classpath.is_empty() {
            argv.push("-classpath".to_string());
            argv.push(classpath.join(":"));
        }
        argv.extend(sources.iter().cloned());

        Process::new(
            argv,
            input_digest,
            format!("Compiling {} (round {}, {} source(s))", request.name, round, sources.len()),
        )
        .with_output_paths(vec![
            CLASSES_DIR.to_string(),
            GENERATED_DIR.to_string(),
            ROUND_REPORT.to_string(),
        ])
    }

    /// Run one compiler process under the configured strategy and timeout
    ///
    /// The worker lease lives for exactly this call; a timed-out worker is
    /// poisoned so the next lease starts a fresh one.
    async fn execute(&self, unit: &str, sandbox: &JdkSandbox, process: Process) -> KilnResult<ProcessResult> {
        let mut lease: Option<WorkerLease> = match self.settings.effective_strategy() {
            ExecutionStrategy::Persistent => {
                let lease = self.pool.acquire(&sandbox.digest.fingerprint).await?;
                if lease.bootstrapped() {
                    self.tracker.emit(format!(
                        "[info] {}: starting compiler worker {} for {}",
                        POOL_BOOTSTRAP_MARKER,
                        lease.slot(),
                        unit
                    ));
                }
                Some(lease)
            }
            ExecutionStrategy::Hermetic => None,
        };
        let process = process.with_worker_slot(lease.as_ref().map(WorkerLease::slot));
        debug!("{}", process.description);

        let Some(limit) = self.settings.timeout else {
            return self.executor.execute(&process).await;
        };
        match tokio::time::timeout(limit, self.executor.execute(&process)).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(lease) = lease.as_mut() {
                    lease.poison();
                }
                warn!("{}: compiler timed out after {:?}", unit, limit);
                Err(KilnError::Timeout {
                    unit: unit.to_string(),
                    seconds: limit.as_secs(),
                })
            }
        }
    }

    fn report_counts(&self, unit: &str, counts: &DiagnosticCounts) {
        if !self.settings.report_diagnostic_counts {
            return;
        }
        self.tracker.emit(format!("Reporting number of diagnostics for: {}", unit));
        for line in counts.report_lines() {
            self.tracker.emit(line);
        }
        self.tracker.record_target_data(unit, "diagnostic_counts", counts.to_json());
    }
}

/// Unit names become directory names inside the sandbox
fn sanitize(unit: &str) -> String {
    unit.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}
