//! Compiler diagnostics
//!
//! Every diagnostic lands in exactly one of four buckets. Counts are summed
//! across annotation-processing rounds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Diagnostic bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Severity {
    /// Classify a compiler-reported level
    ///
    /// Unrecognised levels count as `Information`.
    pub fn classify(level: &str) -> Self {
        match level.trim().to_ascii_lowercase().as_str() {
            "error" | "fatal" => Self::Error,
            "warning" | "warn" | "deprecation" | "mandatory_warning" => Self::Warning,
            "hint" | "suggestion" => Self::Hint,
            _ => Self::Information,
        }
    }

    /// Tag used by the standard logger
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warn",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Information => "Information",
            Self::Hint => "Hint",
        };
        write!(f, "{}", name)
    }
}

/// Per-bucket diagnostic totals
///
/// Serialized with the bucket names as keys, in the order Error, Warning,
/// Information, Hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCounts {
    #[serde(rename = "Error")]
    pub error: usize,
    #[serde(rename = "Warning")]
    pub warning: usize,
    #[serde(rename = "Information")]
    pub information: usize,
    #[serde(rename = "Hint")]
    pub hint: usize,
}

impl DiagnosticCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error += 1,
            Severity::Warning => self.warning += 1,
            Severity::Information => self.information += 1,
            Severity::Hint => self.hint += 1,
        }
    }

    pub fn of(diagnostics: &[Diagnostic]) -> Self {
        let mut counts = Self::default();
        for diagnostic in diagnostics {
            counts.record(diagnostic.severity);
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.error + self.warning + self.information + self.hint
    }

    /// `Error: n`, `Warning: n`, `Information: n`, `Hint: n`
    pub fn report_lines(&self) -> Vec<String> {
        vec![
            format!("Error: {}", self.error),
            format!("Warning: {}", self.warning),
            format!("Information: {}", self.information),
            format!("Hint: {}", self.hint),
        ]
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "Error": self.error,
            "Warning": self.warning,
            "Information": self.information,
            "Hint": self.hint,
        })
    }
}

impl Add for DiagnosticCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            error: self.error + rhs.error,
            warning: self.warning + rhs.warning,
            information: self.information + rhs.information,
            hint: self.hint + rhs.hint,
        }
    }
}

impl AddAssign for DiagnosticCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// One compiler diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub severity: Severity,
    pub message: String,
    /// The offending source line, when the compiler reports it
    pub source_line: Option<String>,
}

impl Diagnostic {
    fn position(&self) -> String {
        match (self.line, self.column) {
            (Some(line), Some(column)) => format!("{}:{}:{}", self.path, line, column),
            (Some(line), None) => format!("{}:{}", self.path, line),
            _ => self.path.clone(),
        }
    }
}

/// Parse `javac`-style output lines (`Path.java:12: warning: message`)
pub fn parse_compiler_output(text: &str) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut awaiting_source = false;

    for line in text.lines() {
        if let Some(diagnostic) = parse_header(line) {
            diagnostics.push(diagnostic);
            awaiting_source = true;
            continue;
        }
        if awaiting_source && !line.trim().is_empty() {
            if let Some(last) = diagnostics.last_mut() {
                last.source_line = Some(line.trim_end().to_string());
            }
        }
        awaiting_source = false;
    }
    diagnostics
}

fn parse_header(line: &str) -> Option<Diagnostic> {
    let (path, rest) = line.split_once(':')?;
    if !(path.ends_with(".java") || path.ends_with(".scala")) {
        return None;
    }
    let (line_no, rest) = rest.split_once(':')?;
    let line_no: u32 = line_no.trim().parse().ok()?;
    let (level, message) = rest.trim_start().split_once(':')?;
    if level.contains(' ') {
        return None;
    }
    Some(Diagnostic {
        path: path.to_string(),
        line: Some(line_no),
        column: None,
        severity: Severity::classify(level),
        message: message.trim().to_string(),
        source_line: None,
    })
}

/// How diagnostics are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerStyle {
    /// Position and message, the offending line, and a summary
    #[default]
    Standard,
    /// Path and summary only
    Barebones,
}

/// Render diagnostics for the user
pub fn render(diagnostics: &[Diagnostic], style: LoggerStyle) -> Vec<String> {
    let mut lines = Vec::new();
    for diagnostic in diagnostics {
        let tag = diagnostic.severity.tag();
        match style {
            LoggerStyle::Standard => {
                lines.push(format!("[{}] {}: {}", tag, diagnostic.position(), diagnostic.message));
                let detail = diagnostic.source_line.as_deref().unwrap_or(&diagnostic.message);
                lines.push(format!("[{}] {}", tag, detail));
            }
            LoggerStyle::Barebones => lines.push(format!("[{}] {}", tag, diagnostic.path)),
        }
    }
    lines.extend(summary_lines(&DiagnosticCounts::of(diagnostics)));
    lines
}

/// `[warn] one warning found` style totals
pub fn summary_lines(counts: &DiagnosticCounts) -> Vec<String> {
    let mut lines = Vec::new();
    if counts.warning > 0 {
        lines.push(format!("[warn] {} found", quantity(counts.warning, "warning")));
    }
    if counts.error > 0 {
        lines.push(format!("[error] {} found", quantity(counts.error, "error")));
    }
    lines
}

fn quantity(n: usize, noun: &str) -> String {
    let count = match n {
        1 => "one".to_string(),
        2 => "two".to_string(),
        3 => "three".to_string(),
        4 => "four".to_string(),
        n => n.to_string(),
    };
    if n == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
