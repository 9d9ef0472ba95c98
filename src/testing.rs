//! Fakes for unit tests
//!
//! `FakeExecutor` stands in for both the JDK locator and the compiler. The
//! compiler reads its sources out of the input digest and obeys directives in
//! comments:
//!
//! | directive                     | effect                                        |
//! |-------------------------------|-----------------------------------------------|
//! | `// kiln:warn <msg>`          | warning diagnostic (dropped under `-nowarn`)  |
//! | `// kiln:error <msg>`         | error diagnostic, exit code 1                 |
//! | `// kiln:generate <path>`     | writes `generated/<path>` and reports it      |
//! | `// kiln:requires <class>`    | fails unless a classpath entry holds `<class>`|
//! | `// kiln:sleep <ms>`          | sleeps before finishing                       |
//!
//! Warnings become a failure under `-Werror`.

use crate::analysis::{DependencyAnalyzer, SourceParser};
use crate::cache::IncrementalCache;
use crate::classpath::{ClasspathResolver, Coordinate, CoordinateFetcher, Lockfile, LockfileEntry};
use crate::compile::{CompileOrchestrator, CompileSettings, ROUND_REPORT};
use crate::error::{KilnError, KilnResult};
use crate::process::{Process, ProcessExecutor, ProcessResult};
use crate::sandbox::{JdkLocator, JdkSandboxBuilder, PREPARATION_SCRIPT};
use crate::store::{ContentStore, Digest, MemoryStore};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAILGUN_BYTES: &[u8] = b"PK\x03\x04 nailgun-server-0.9.1";
pub const GUAVA_BYTES: &[u8] = b"PK\x03\x04 guava-31.0-jre";
pub const FAILUREACCESS_BYTES: &[u8] = b"PK\x03\x04 failureaccess-1.0.1";

pub fn nailgun_entry() -> LockfileEntry {
    LockfileEntry::leaf(
        "com.martiansoftware:nailgun-server:0.9.1".parse().unwrap(),
        "nailgun-server-0.9.1.jar",
        Digest::of_bytes(NAILGUN_BYTES),
    )
}

pub fn guava() -> Coordinate {
    "com.google.guava:guava:31.0-jre".parse().unwrap()
}

/// Lockfile pinning guava and its one dependency
pub fn guava_lockfile() -> Lockfile {
    let failureaccess: Coordinate = "com.google.guava:failureaccess:1.0.1".parse().unwrap();
    let mut guava_entry = LockfileEntry::leaf(guava(), "guava-31.0-jre.jar", Digest::of_bytes(GUAVA_BYTES));
    guava_entry.direct_dependencies.insert(failureaccess.clone());
    guava_entry.dependencies.insert(failureaccess.clone());
    Lockfile::new(vec![
        LockfileEntry::leaf(failureaccess, "failureaccess-1.0.1.jar", Digest::of_bytes(FAILUREACCESS_BYTES)),
        guava_entry,
    ])
}

/// Parser understanding `package`, `import` and top-level `class` lines
///
/// A source containing `// kiln:malformed` yields a record missing its
/// required keys.
pub struct LineParser;

#[async_trait]
impl SourceParser for LineParser {
    async fn parse(&self, _path: &str, source: &[u8]) -> KilnResult<Vec<u8>> {
        let text = String::from_utf8_lossy(source);
        if text.contains("// kiln:malformed") {
            return Ok(br#"{"declaredPackage": null, "imports": []}"#.to_vec());
        }

        let mut package: Option<String> = None;
        let mut imports = Vec::new();
        let mut types = Vec::new();
        for line in text.lines() {
            let line = line.split("//").next().unwrap_or_default().trim();
            if let Some(rest) = line.strip_prefix("package ") {
                package = Some(rest.trim_end_matches(';').trim().to_string());
            } else if let Some(rest) = line.strip_prefix("import ") {
                let rest = rest.trim_end_matches(';').trim();
                let (is_static, rest) = match rest.strip_prefix("static ") {
                    Some(rest) => (true, rest.trim()),
                    None => (false, rest),
                };
                let (name, is_asterisk) = match rest.strip_suffix(".*") {
                    Some(name) => (name, true),
                    None => (rest, false),
                };
                imports.push(json!({"name": name, "isStatic": is_static, "isAsterisk": is_asterisk}));
            } else if let Some(rest) = line.trim_start_matches("public ").strip_prefix("class ") {
                let name: String = rest.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
                types.push(match &package {
                    Some(package) => format!("{}.{}", package, name),
                    None => name,
                });
            }
        }

        Ok(serde_json::to_vec(&json!({
            "declaredPackage": package,
            "imports": imports,
            "topLevelTypes": types,
            "consumedUnqualifiedTypes": [],
        }))?)
    }
}

/// Fetcher serving artifacts from memory by file name
#[derive(Default)]
pub struct FakeFetcher {
    artifacts: HashMap<String, Vec<u8>>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, file_name: &str, bytes: impl AsRef<[u8]>) -> Self {
        self.artifacts.insert(file_name.to_string(), bytes.as_ref().to_vec());
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoordinateFetcher for FakeFetcher {
    async fn fetch(&self, entry: &LockfileEntry) -> KilnResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.artifacts
            .get(&entry.file_name)
            .cloned()
            .ok_or_else(|| KilnError::Fetch {
                coordinate: entry.coord.to_string(),
                reason: "not found".to_string(),
            })
    }
}

/// Scripted JDK locator and compiler
#[derive(Default)]
pub struct FakeExecutor {
    store: Option<Arc<dyn ContentStore>>,
    locate_failure: Option<String>,
    locates: AtomicUsize,
    compiles: Mutex<Vec<Vec<String>>>,
}

impl FakeExecutor {
    /// Locator only; compiler processes are rejected
    pub fn new() -> Self {
        Self::default()
    }

    /// Locator and compiler reading inputs from `store`
    pub fn compiler(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    pub fn failing_locate(mut self, stderr: &str) -> Self {
        self.locate_failure = Some(stderr.to_string());
        self
    }

    pub fn locate_count(&self) -> usize {
        self.locates.load(Ordering::SeqCst)
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.lock().unwrap().len()
    }

    /// Argv of every compiler invocation, in order
    pub fn compile_argvs(&self) -> Vec<Vec<String>> {
        self.compiles.lock().unwrap().clone()
    }

    fn locate(&self) -> ProcessResult {
        self.locates.fetch_add(1, Ordering::SeqCst);
        match &self.locate_failure {
            Some(stderr) => ProcessResult {
                exit_code: 1,
                stdout: Vec::new(),
                stderr: stderr.clone().into_bytes(),
                output_digest: Digest::empty(),
            },
            None => ProcessResult {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: b"openjdk version \"17.0.2\" 2022-01-18\n".to_vec(),
                output_digest: Digest::empty(),
            },
        }
    }

    async fn compile(&self, process: &Process) -> KilnResult<ProcessResult> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| KilnError::Internal("FakeExecutor has no store".to_string()))?;
        self.compiles.lock().unwrap().push(process.argv.clone());

        let argv = &process.argv;
        let has = |flag: &str| argv.iter().any(|a| a == flag);
        let (werror, nowarn) = (has("-Werror"), has("-nowarn"));
        let classpath: Vec<String> = argv
            .iter()
            .position(|a| a == "-classpath")
            .and_then(|i| argv.get(i + 1))
            .map(|cp| cp.split(':').map(str::to_string).collect())
            .unwrap_or_default();

        let mut diagnostics: Vec<Value> = Vec::new();
        let mut generated: Vec<String> = Vec::new();
        let mut outputs: Vec<Digest> = Vec::new();
        let mut stderr = String::new();
        let mut errors = 0;

        for path in argv.iter().filter(|a| a.ends_with(".java")) {
            let bytes = store
                .read_file(&process.input_digest, path)
                .await?
                .ok_or_else(|| KilnError::process("fake javac", format!("{} not in input", path)))?;
            let text = String::from_utf8_lossy(&bytes).to_string();
            let mut package: Option<String> = None;

            for (index, line) in text.lines().enumerate() {
                let number = index + 1;
                if let Some(rest) = line.trim().strip_prefix("package ") {
                    package = Some(rest.trim_end_matches(';').trim().to_string());
                }
                let Some((_, directive)) = line.split_once("// kiln:") else {
                    continue;
                };
                let (command, arg) = directive.split_once(' ').unwrap_or((directive, ""));
                let arg = arg.trim();
                match command.trim() {
                    "warn" if !nowarn => diagnostics.push(json!({
                        "path": path, "line": number, "column": 1, "severity": "warning",
                        "message": arg, "source_line": line.trim(),
                    })),
                    "error" => {
                        errors += 1;
                        stderr.push_str(&format!("{}:{}: error: {}\n", path, number, arg));
                        diagnostics.push(json!({
                            "path": path, "line": number, "severity": "error", "message": arg,
                        }));
                    }
                    "generate" => {
                        let target = format!("generated/{}", arg);
                        let stem = file_stem(arg);
                        let content = match &package {
                            Some(package) => format!("package {};\nclass {} {{}}\n", package, stem),
                            None => format!("class {} {{}}\n", stem),
                        };
                        outputs.push(store.create_file(&target, content.into_bytes(), false).await?);
                        generated.push(target);
                    }
                    "requires" => {
                        let mut found = false;
                        for entry in &classpath {
                            let candidate = format!("{}/{}", entry, arg);
                            if store.read_file(&process.input_digest, &candidate).await?.is_some() {
                                found = true;
                                break;
                            }
                        }
                        if !found {
                            errors += 1;
                            stderr.push_str(&format!("{}:{}: error: cannot find symbol {}\n", path, number, arg));
                            diagnostics.push(json!({
                                "path": path, "line": number, "severity": "error",
                                "message": format!("cannot find symbol {}", arg),
                            }));
                        }
                    }
                    "sleep" => {
                        let ms: u64 = arg.parse().unwrap_or(0);
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                    }
                    _ => {}
                }
            }

            let class_path = match &package {
                Some(package) => format!("classes/{}/{}.class", package.replace('.', "/"), file_stem(path)),
                None => format!("classes/{}.class", file_stem(path)),
            };
            let class_bytes = format!("compiled:{}", text).into_bytes();
            outputs.push(store.create_file(&class_path, class_bytes, false).await?);
        }

        let warnings = diagnostics.iter().filter(|d| d["severity"] == "warning").count();
        if werror && warnings > 0 {
            errors += 1;
            stderr.push_str("error: warnings found and -Werror specified\n");
            diagnostics.push(json!({
                "path": "javac", "severity": "error", "message": "warnings found and -Werror specified",
            }));
        }

        let report = json!({"diagnostics": diagnostics, "generated_sources": generated});
        outputs.push(
            store
                .create_file(ROUND_REPORT, serde_json::to_vec(&report)?, false)
                .await?,
        );

        Ok(ProcessResult {
            exit_code: if errors > 0 { 1 } else { 0 },
            stdout: Vec::new(),
            stderr: stderr.into_bytes(),
            output_digest: store.merge(&outputs).await?,
        })
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl ProcessExecutor for FakeExecutor {
    async fn execute(&self, process: &Process) -> KilnResult<ProcessResult> {
        let argv = &process.argv;
        if argv.get(1).map(String::as_str) == Some("-c") && argv.get(2).is_some_and(|c| c.contains("java-home")) {
            return Ok(self.locate());
        }
        if argv.get(1).map(String::as_str) == Some(PREPARATION_SCRIPT) {
            return self.compile(process).await;
        }
        Err(KilnError::process(argv.join(" "), "unexpected process"))
    }
}

/// A fully wired orchestrator over in-memory fakes
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<FakeFetcher>,
    pub executor: Arc<FakeExecutor>,
    pub orchestrator: CompileOrchestrator,
}

impl Harness {
    pub fn new(mut settings: CompileSettings) -> Self {
        settings.persistent_server = nailgun_entry();

        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(
            FakeFetcher::new()
                .with_artifact("nailgun-server-0.9.1.jar", NAILGUN_BYTES)
                .with_artifact("guava-31.0-jre.jar", GUAVA_BYTES)
                .with_artifact("failureaccess-1.0.1.jar", FAILUREACCESS_BYTES),
        );
        let executor = Arc::new(FakeExecutor::compiler(store.clone()));
        let resolver = Arc::new(ClasspathResolver::new(fetcher.clone(), store.clone()));
        let sandboxes = Arc::new(JdkSandboxBuilder::new(
            resolver.clone(),
            executor.clone(),
            store.clone(),
            JdkLocator::new("/opt/coursier/cs", Digest::empty()),
            "/bin/sh",
        ));
        let cache = Arc::new(IncrementalCache::in_memory(store.clone()));
        let orchestrator = CompileOrchestrator::new(
            store.clone(),
            resolver,
            sandboxes,
            executor.clone(),
            cache,
            Arc::new(guava_lockfile()),
            settings,
        )
        .unwrap();

        Self {
            store,
            fetcher,
            executor,
            orchestrator,
        }
    }

    pub fn with_analysis(mut self) -> Self {
        self.orchestrator = self
            .orchestrator
            .with_analyzer(DependencyAnalyzer::new(Arc::new(LineParser)));
        self
    }
}
