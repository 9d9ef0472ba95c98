//! Error types for Kiln
//!
//! All modules use `KilnResult<T>` as their return type.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for Kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in Kiln
///
/// Errors are `Clone` so a memoized failure can be handed to every task that
/// was waiting on the same shared computation.
#[derive(Error, Debug, Clone)]
pub enum KilnError {
    // Dependency analysis
    #[error("Malformed dependency analysis for {path}: {reason}")]
    MalformedAnalysis { path: String, reason: String },

    // Classpath resolution
    #[error(
        "Integrity violation for {coordinate}: expected {expected}, fetched content hashes to {actual}"
    )]
    IntegrityViolation {
        coordinate: String,
        expected: String,
        actual: String,
    },

    #[error("Coordinate {0} is not pinned in the lockfile")]
    UnpinnedCoordinate(String),

    #[error("Failed to fetch {coordinate}: {reason}")]
    Fetch { coordinate: String, reason: String },

    // JDK sandbox
    #[error("Failed to locate Java for JDK `{selector}`:\n{stderr}")]
    JdkNotFound { selector: String, stderr: String },

    // Compilation
    #[error("Compilation of {unit} failed with exit code {exit_code}\n{stderr}")]
    CompileFailure {
        unit: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Compilation of {unit} timed out after {seconds}s")]
    Timeout { unit: String, seconds: u64 },

    #[error("{unit} is blocked: dependency {dependency} failed")]
    DependencyFailed { unit: String, dependency: String },

    #[error("{failed} of {total} compile unit(s) failed")]
    UnitsFailed { failed: usize, total: usize },

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Collaborators
    #[error("Process execution error: {command}: {reason}")]
    Process { command: String, reason: String },

    #[error("Content store error: {0}")]
    Store(String),

    #[error("Cache backend error at {location}: {reason}")]
    CacheBackend { location: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    #[error("TOML parse error: {0}")]
    TomlParse(#[source] Arc<toml::de::Error>),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[source] Arc<toml::ser::Error>),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for KilnError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(Arc::new(e))
    }
}

impl From<toml::de::Error> for KilnError {
    fn from(e: toml::de::Error) -> Self {
        Self::TomlParse(Arc::new(e))
    }
}

impl From<toml::ser::Error> for KilnError {
    fn from(e: toml::ser::Error) -> Self {
        Self::TomlSerialize(Arc::new(e))
    }
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a process execution error
    pub fn process(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Process {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Whether this error ends a unit as a failed compile (timeouts included)
    pub fn is_compile_failure(&self) -> bool {
        matches!(self, Self::CompileFailure { .. } | Self::Timeout { .. })
    }

    /// Check if error is retryable within the same build invocation
    ///
    /// Nothing in the compile pipeline retries automatically; transient
    /// fetch and backend hiccups are the only candidates.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::CacheBackend { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::IntegrityViolation { .. } => {
                Some("The artifact store or the lockfile has been tampered with; regenerate the lockfile from a trusted resolve")
            }
            Self::UnpinnedCoordinate(_) => Some("Regenerate the lockfile so every requested coordinate is pinned"),
            Self::JdkNotFound { .. } => Some("Check `jdk.selector`, or set it to \"system\" to use the installed JDK"),
            Self::Timeout { .. } => Some("Raise `compile.timeout_secs` and start a fresh build"),
            Self::Configuration(_) => Some("Run: kiln config show"),
            _ => None,
        }
    }
}
