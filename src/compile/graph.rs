//! Compiling a set of units that depend on each other

use super::orchestrator::{CompileOrchestrator, CompileOutcome, CompileRequest};
use crate::error::{KilnError, KilnResult};
use crate::memo::OnceMap;
use futures_util::future::{join_all, BoxFuture};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

type Index<'a> = HashMap<&'a str, &'a CompileRequest>;

/// Called once per unit as soon as it finishes, in completion order
pub type FinishedHook = Arc<dyn Fn(&str, &KilnResult<CompileOutcome>) + Send + Sync>;

/// Schedules compile units over one orchestrator
///
/// Every unit runs as soon as its dependencies have finished; units with no
/// path between them run concurrently. A failed unit blocks its dependents,
/// which fail with `DependencyFailed` without running.
pub struct CompileSession {
    orchestrator: CompileOrchestrator,
    on_finished: Option<FinishedHook>,
}

impl CompileSession {
    pub fn new(orchestrator: CompileOrchestrator) -> Self {
        Self {
            orchestrator,
            on_finished: None,
        }
    }

    pub fn with_finished_hook(mut self, hook: FinishedHook) -> Self {
        self.on_finished = Some(hook);
        self
    }

    pub fn orchestrator(&self) -> &CompileOrchestrator {
        &self.orchestrator
    }

    /// Compile every request; results come back in request order
    ///
    /// Graph problems (duplicate names, unknown dependencies, cycles) fail the
    /// whole call before anything runs.
    pub async fn compile_all(
        &self,
        requests: &[CompileRequest],
    ) -> KilnResult<Vec<(String, KilnResult<CompileOutcome>)>> {
        let index = build_index(requests)?;
        detect_cycle(requests, &index)?;

        let outcomes: OnceMap<String, CompileOutcome> = OnceMap::new();
        let results = join_all(
            requests
                .iter()
                .map(|request| self.evaluate(&index, &outcomes, request.name.as_str())),
        )
        .await;

        let mut failed = 0;
        let named: Vec<(String, KilnResult<CompileOutcome>)> = requests
            .iter()
            .zip(results)
            .map(|(request, result)| {
                if result.is_err() {
                    failed += 1;
                }
                (request.name.clone(), result)
            })
            .collect();
        info!("Compiled {} unit(s), {} failed", named.len() - failed, failed);
        Ok(named)
    }

    fn evaluate<'a>(
        &'a self,
        index: &'a Index<'a>,
        outcomes: &'a OnceMap<String, CompileOutcome>,
        name: &'a str,
    ) -> BoxFuture<'a, KilnResult<CompileOutcome>> {
        Box::pin(async move {
            outcomes
                .get_or_compute(name.to_string(), || async move {
                    let result = self.run_unit(index, outcomes, name).await;
                    if let Some(hook) = &self.on_finished {
                        hook(name, &result);
                    }
                    result
                })
                .await
        })
    }

    async fn run_unit<'a>(
        &'a self,
        index: &'a Index<'a>,
        outcomes: &'a OnceMap<String, CompileOutcome>,
        name: &'a str,
    ) -> KilnResult<CompileOutcome> {
        let request = index
            .get(name)
            .ok_or_else(|| KilnError::config(format!("unknown compile unit `{}`", name)))?;

        let finished = join_all(
            request
                .dependencies
                .iter()
                .map(|dependency| self.evaluate(index, outcomes, dependency.as_str())),
        )
        .await;
        for (dependency, result) in request.dependencies.iter().zip(&finished) {
            if let Err(e) = result {
                warn!("{} is blocked by {}: {}", name, dependency, e);
                return Err(KilnError::DependencyFailed {
                    unit: name.to_string(),
                    dependency: dependency.clone(),
                });
            }
        }

        let upstream = upstream_outcomes(request, index, outcomes)?;
        self.orchestrator.compile(request, &upstream).await
    }
}

fn build_index(requests: &[CompileRequest]) -> KilnResult<Index<'_>> {
    let mut index = HashMap::with_capacity(requests.len());
    for request in requests {
        if index.insert(request.name.as_str(), request).is_some() {
            return Err(KilnError::config(format!("compile unit `{}` is declared twice", request.name)));
        }
    }
    for request in requests {
        for dependency in &request.dependencies {
            if !index.contains_key(dependency.as_str()) {
                return Err(KilnError::config(format!(
                    "compile unit `{}` depends on unknown unit `{}`",
                    request.name, dependency
                )));
            }
        }
    }
    Ok(index)
}

fn detect_cycle(requests: &[CompileRequest], index: &Index<'_>) -> KilnResult<()> {
    fn visit<'a>(
        name: &'a str,
        index: &Index<'a>,
        done: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> KilnResult<()> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|n| *n == name) {
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(KilnError::DependencyCycle(cycle));
        }
        path.push(name);
        if let Some(request) = index.get(name).copied() {
            for dependency in &request.dependencies {
                visit(dependency.as_str(), index, done, path)?;
            }
        }
        path.pop();
        done.insert(name);
        Ok(())
    }

    let mut done = HashSet::new();
    for request in requests {
        visit(request.name.as_str(), index, &mut done, &mut Vec::new())?;
    }
    Ok(())
}

/// Finished outcomes of every unit `request` depends on, transitively
///
/// Direct dependencies come first, in declared order, each followed by its
/// own dependencies; a unit reachable twice appears once.
fn upstream_outcomes(
    request: &CompileRequest,
    index: &Index<'_>,
    outcomes: &OnceMap<String, CompileOutcome>,
) -> KilnResult<Vec<CompileOutcome>> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut pending: Vec<&str> = request.dependencies.iter().rev().map(String::as_str).collect();

    while let Some(name) = pending.pop() {
        if !seen.insert(name) {
            continue;
        }
        match outcomes.peek(&name.to_string()) {
            Some(Ok(outcome)) => ordered.push(outcome),
            _ => {
                return Err(KilnError::Internal(format!(
                    "{} has no finished outcome for {}",
                    request.name, name
                )))
            }
        }
        if let Some(dependency) = index.get(name) {
            pending.extend(dependency.dependencies.iter().rev().map(String::as_str));
        }
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::CompileSettings;
    use crate::store::ContentStore;
    use crate::testing::Harness;

    fn lib(signature: &str) -> CompileRequest {
        CompileRequest::new("lib").with_source(
            "org/lib/A.java",
            format!("package org.lib;\npublic class A {{ {} }}\n", signature),
        )
    }

    fn app() -> CompileRequest {
        CompileRequest::new("app")
            .with_source(
                "org/app/B.java",
                "package org.app;\n// kiln:requires org/lib/A.class\npublic class B { void run() { A.x(); } }\n",
            )
            .with_dependency("lib")
    }

    fn standalone() -> CompileRequest {
        CompileRequest::new("standalone").with_source("C.java", "public class C {}\n")
    }

    fn outcome<'a>(results: &'a [(String, KilnResult<CompileOutcome>)], name: &str) -> &'a KilnResult<CompileOutcome> {
        &results.iter().find(|(n, _)| n == name).unwrap().1
    }

    #[tokio::test]
    async fn dependents_compile_against_upstream_output() {
        let h = Harness::new(CompileSettings::default());
        let executor = h.executor.clone();
        let store = h.store.clone();
        let session = CompileSession::new(h.orchestrator);

        let results = session
            .compile_all(&[app(), lib("static void x(Integer y) {}")])
            .await
            .unwrap();
        assert_eq!(results[0].0, "app");
        let app_outcome = outcome(&results, "app").as_ref().unwrap();
        assert!(store
            .list_files(&app_outcome.output_digest)
            .await
            .unwrap()
            .contains(&"classes/org/app/B.class".to_string()));

        let argvs = executor.compile_argvs();
        let app_argv = argvs.iter().find(|argv| argv.contains(&"org/app/B.java".to_string())).unwrap();
        assert!(app_argv.iter().any(|arg| arg.contains("deps/0-lib/classes")));
    }

    #[tokio::test]
    async fn bytecode_change_upstream_invalidates_dependents() {
        let h = Harness::new(CompileSettings::default());
        let executor = h.executor.clone();
        let session = CompileSession::new(h.orchestrator);

        let before = "static void x(Integer y) {}";
        let first = session.compile_all(&[lib(before), app(), standalone()]).await.unwrap();
        assert!(first.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(executor.compile_count(), 3);

        // Nothing changed: everything is served from the cache.
        let second = session.compile_all(&[lib(before), app(), standalone()]).await.unwrap();
        assert!(second.iter().all(|(_, r)| r.as_ref().unwrap().from_cache));
        assert_eq!(executor.compile_count(), 3);

        // Source compatible for callers, different bytecode for A.
        let after = "static void x(Integer y) {} static void x(Integer y, Integer z) {}";
        let third = session.compile_all(&[lib(after), app(), standalone()]).await.unwrap();
        assert!(!outcome(&third, "lib").as_ref().unwrap().from_cache);
        assert!(!outcome(&third, "app").as_ref().unwrap().from_cache);
        assert!(outcome(&third, "standalone").as_ref().unwrap().from_cache);
        assert_eq!(executor.compile_count(), 5);
    }

    #[tokio::test]
    async fn failed_dependency_blocks_dependents_only() {
        let h = Harness::new(CompileSettings::default());
        let executor = h.executor.clone();
        let session = CompileSession::new(h.orchestrator);
        let broken = CompileRequest::new("lib").with_source("org/lib/A.java", "// kiln:error boom\nclass A {}\n");

        let results = session.compile_all(&[broken, app(), standalone()]).await.unwrap();
        assert!(matches!(outcome(&results, "lib"), Err(KilnError::CompileFailure { .. })));
        match outcome(&results, "app") {
            Err(KilnError::DependencyFailed { unit, dependency }) => {
                assert_eq!(unit, "app");
                assert_eq!(dependency, "lib");
            }
            other => panic!("expected DependencyFailed, got {other:?}"),
        }
        assert!(outcome(&results, "standalone").is_ok());
        assert_eq!(executor.compile_count(), 2);
    }

    #[tokio::test]
    async fn missing_dependency_edge_fails_the_compile() {
        let h = Harness::new(CompileSettings::default());
        let session = CompileSession::new(h.orchestrator);
        let mut orphan = app();
        orphan.dependencies.clear();

        let results = session
            .compile_all(&[lib("static void x(Integer y) {}"), orphan])
            .await
            .unwrap();
        assert!(matches!(outcome(&results, "app"), Err(KilnError::CompileFailure { .. })));
    }

    #[tokio::test]
    async fn transitive_outputs_reach_the_classpath() {
        let h = Harness::new(CompileSettings::default());
        let executor = h.executor.clone();
        let session = CompileSession::new(h.orchestrator);
        let top = CompileRequest::new("top")
            .with_source("org/top/T.java", "package org.top;\n// kiln:requires org/lib/A.class\nclass T {}\n")
            .with_dependency("app");

        let results = session
            .compile_all(&[top, app(), lib("static void x(Integer y) {}")])
            .await
            .unwrap();
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let argvs = executor.compile_argvs();
        let top_argv = argvs.iter().find(|argv| argv.contains(&"org/top/T.java".to_string())).unwrap();
        let classpath = top_argv.iter().find(|arg| arg.contains("deps/")).unwrap();
        assert!(classpath.ends_with("deps/0-app/classes:deps/1-lib/classes"));
    }

    #[tokio::test]
    async fn finished_hook_sees_every_unit_once() {
        let h = Harness::new(CompileSettings::default());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = seen.clone();
        let session = CompileSession::new(h.orchestrator).with_finished_hook(Arc::new(move |name, result| {
            record.lock().unwrap().push((name.to_string(), result.is_ok()));
        }));
        let broken = CompileRequest::new("lib").with_source("org/lib/A.java", "// kiln:error boom\nclass A {}\n");

        session.compile_all(&[app(), broken, standalone()]).await.unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("app".to_string(), false),
                ("lib".to_string(), false),
                ("standalone".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn graph_errors_fail_before_compiling() {
        let h = Harness::new(CompileSettings::default());
        let executor = h.executor.clone();
        let session = CompileSession::new(h.orchestrator);

        let a = CompileRequest::new("a").with_dependency("b");
        let b = CompileRequest::new("b").with_dependency("a");
        let err = session.compile_all(&[a, b]).await.unwrap_err();
        match err {
            KilnError::DependencyCycle(path) => assert_eq!(path, vec!["a", "b", "a"]),
            other => panic!("expected DependencyCycle, got {other:?}"),
        }

        let dangling = CompileRequest::new("a").with_dependency("ghost");
        let err = session.compile_all(&[dangling]).await.unwrap_err();
        assert!(matches!(err, KilnError::Configuration(ref m) if m.contains("ghost")));

        let err = session.compile_all(&[standalone(), standalone()]).await.unwrap_err();
        assert!(matches!(err, KilnError::Configuration(ref m) if m.contains("declared twice")));
        assert_eq!(executor.compile_count(), 0);
    }
}
