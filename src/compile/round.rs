//! Per-round compiler reports
//!
//! After each round the compiler writes `__kiln_round.json` at the sandbox
//! root:
//!
//! ```json
//! { "diagnostics": [ { "path": "A.java", "line": 2, "column": 14,
//!                      "severity": "warning", "message": "Unused import",
//!                      "source_line": "import java.util.List;" } ],
//!   "generated_sources": ["generated/org/a/A_Builder.java"] }
//! ```
//!
//! A compiler that writes no report is read from its output streams instead,
//! with no generated sources.

use super::diagnostics::{parse_compiler_output, Diagnostic, Severity};
use crate::error::{KilnError, KilnResult};
use crate::store::{ContentStore, Digest};
use serde::Deserialize;

/// Sandbox path of the round report
pub const ROUND_REPORT: &str = "__kiln_round.json";

#[derive(Debug, Deserialize)]
struct WireDiagnostic {
    path: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
    severity: String,
    message: String,
    #[serde(default)]
    source_line: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireReport {
    #[serde(default)]
    diagnostics: Vec<WireDiagnostic>,
    #[serde(default)]
    generated_sources: Vec<String>,
}

/// What one round produced besides class files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub diagnostics: Vec<Diagnostic>,
    pub generated_sources: Vec<String>,
}

impl RoundReport {
    pub fn parse(bytes: &[u8]) -> KilnResult<Self> {
        let wire: WireReport = serde_json::from_slice(bytes).map_err(|e| {
            KilnError::process("compiler round report", format!("unreadable {}: {}", ROUND_REPORT, e))
        })?;
        Ok(Self {
            diagnostics: wire
                .diagnostics
                .into_iter()
                .map(|d| Diagnostic {
                    path: d.path,
                    line: d.line,
                    column: d.column,
                    severity: Severity::classify(&d.severity),
                    message: d.message,
                    source_line: d.source_line,
                })
                .collect(),
            generated_sources: wire.generated_sources,
        })
    }

    /// Read the report out of a round's output, falling back to the
    /// compiler's output streams
    pub async fn from_output(
        store: &dyn ContentStore,
        output: &Digest,
        stdout: &str,
        stderr: &str,
    ) -> KilnResult<Self> {
        match store.read_file(output, ROUND_REPORT).await? {
            Some(bytes) => Self::parse(&bytes),
            None => {
                let mut diagnostics = parse_compiler_output(stderr);
                diagnostics.extend(parse_compiler_output(stdout));
                Ok(Self {
                    diagnostics,
                    generated_sources: Vec::new(),
                })
            }
        }
    }
}
