//! Compile orchestration
//!
//! A unit moves through `Pending -> Analyzing -> ClasspathReady ->
//! SandboxReady -> Executing -> {AwaitingNextRound -> Executing}* ->
//! {Succeeded, Failed}`. Sessions schedule many units over one
//! orchestrator so that shared setup (classpath entries, the JDK sandbox,
//! warm compiler workers) is done once.

mod diagnostics;
mod graph;
mod options;
mod orchestrator;
mod round;
mod state;

pub use diagnostics::{parse_compiler_output, render, summary_lines, Diagnostic, DiagnosticCounts, LoggerStyle, Severity};
pub use graph::{CompileSession, FinishedHook};
pub use options::{unsupported_flag_warnings, CompilerArgs, OptionSettings, UNSUPPORTED_FLAGS};
pub use orchestrator::{
    CompileOrchestrator, CompileOutcome, CompileRequest, CompileSettings, ExecutionStrategy, CLASSES_DIR,
    GENERATED_DIR, MAX_ROUNDS,
};
pub use round::{RoundReport, ROUND_REPORT};
pub use state::{UnitProgress, UnitState};
