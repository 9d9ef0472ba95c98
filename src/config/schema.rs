//! Configuration schema for kiln
//!
//! Configuration is stored at `~/.config/kiln/config.toml`

use crate::cache::Platform;
use crate::classpath::LockfileEntry;
use crate::compile::{CompileSettings, ExecutionStrategy, LoggerStyle, OptionSettings};
use crate::error::{KilnError, KilnResult};
use crate::sandbox::{default_persistent_server, JdkSelector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// JDK selection and sandbox tooling
    pub jdk: JdkConfig,

    /// Compiler invocation
    pub compile: CompileConfig,

    /// Named JVM platforms
    pub platforms: PlatformsConfig,

    /// Compile cache locations
    pub cache: CacheConfig,

    /// Source dependency analysis
    pub analysis: AnalysisConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,

    /// Root for run metadata (defaults to the kiln state directory)
    pub workdir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
            workdir: None,
        }
    }
}

/// JDK configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JdkConfig {
    /// "system" or a managed JDK version such as "adopt:1.11"
    pub selector: JdkSelector,

    /// Tool printing a JDK home for `java-home --system-jvm|--jvm=<v>`
    pub locator_exe: String,

    /// Shell running the sandbox preparation script
    pub shell: String,

    /// Pinned persistent compiler server artifact
    pub persistent_server: LockfileEntry,
}

impl Default for JdkConfig {
    fn default() -> Self {
        Self {
            selector: JdkSelector::System,
            locator_exe: "cs".to_string(),
            shell: "/bin/sh".to_string(),
            persistent_server: default_persistent_server(),
        }
    }
}

/// Compiler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// "persistent" or "hermetic"
    pub execution_strategy: ExecutionStrategy,

    /// Incremental mode; off forces hermetic execution
    pub incremental: bool,

    /// Persistent compiler workers
    pub worker_pool_size: usize,

    /// Per-process timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Arguments passed to every compile
    pub args: Vec<String>,

    /// Option sets active for every unit
    pub default_compiler_option_sets: Vec<String>,

    /// Print and record diagnostic counts per unit
    pub report_diagnostic_counts: bool,

    /// "standard" or "barebones"
    pub logger: LoggerStyle,

    /// Add `-g`
    pub debug_symbols: bool,

    /// Compiler entry point class
    pub compiler_main: String,

    /// Option set name -> arguments appended when active
    pub compiler_option_sets_enabled_args: BTreeMap<String, Vec<String>>,

    /// Option set name -> arguments passed while the set is inactive;
    /// an active set strips them from the base args
    pub compiler_option_sets_disabled_args: BTreeMap<String, Vec<String>>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        let mut enabled = BTreeMap::new();
        enabled.insert("fatal_warnings".to_string(), vec!["-Werror".to_string()]);
        Self {
            execution_strategy: ExecutionStrategy::Persistent,
            incremental: true,
            worker_pool_size: 4,
            timeout_secs: None,
            args: vec!["-encoding".to_string(), "UTF-8".to_string()],
            default_compiler_option_sets: vec![],
            report_diagnostic_counts: false,
            logger: LoggerStyle::Standard,
            debug_symbols: false,
            compiler_main: "com.sun.tools.javac.Main".to_string(),
            compiler_option_sets_enabled_args: enabled,
            compiler_option_sets_disabled_args: BTreeMap::new(),
        }
    }
}

/// One JVM platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub source: String,
    pub target: String,
}

/// Platform configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    /// Platform used when a unit names none
    pub default_platform: Option<String>,

    /// Platform name -> versions
    pub definitions: BTreeMap<String, PlatformConfig>,
}

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Locations consulted, in order, before compiling
    pub read_from: Vec<String>,

    /// Locations receiving every successful compile
    pub write_to: Vec<String>,
}

/// Analysis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Parser argv; the source arrives on stdin, the wire record is read from stdout
    pub parser_command: Vec<String>,
}

impl Config {
    /// Option settings derived from `[compile]` and `[platforms]`
    pub fn option_settings(&self) -> OptionSettings {
        OptionSettings {
            args: self.compile.args.clone(),
            default_option_sets: self.compile.default_compiler_option_sets.clone(),
            enabled_args: self.compile.compiler_option_sets_enabled_args.clone(),
            disabled_args: self.compile.compiler_option_sets_disabled_args.clone(),
            debug_symbols: self.compile.debug_symbols,
            platforms: self
                .platforms
                .definitions
                .iter()
                .map(|(name, p)| (name.clone(), Platform::new(&p.source, &p.target)))
                .collect(),
            default_platform: self.platforms.default_platform.clone(),
        }
    }

    /// Reject settings that could only fail once compiles start
    pub fn validate(&self) -> KilnResult<()> {
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(KilnError::config(format!(
                "general.log_format must be \"text\" or \"json\", got \"{}\"",
                self.general.log_format
            )));
        }
        if self.compile.worker_pool_size == 0 {
            return Err(KilnError::config("compile.worker_pool_size must be at least 1"));
        }
        if self.compile.timeout_secs == Some(0) {
            return Err(KilnError::config("compile.timeout_secs must be positive"));
        }
        self.option_settings().validate()
    }

    /// Session-wide compile settings
    pub fn compile_settings(&self) -> KilnResult<CompileSettings> {
        self.validate()?;
        Ok(CompileSettings {
            jdk: self.jdk.selector.clone(),
            persistent_server: self.jdk.persistent_server.clone(),
            strategy: self.compile.execution_strategy,
            incremental: self.compile.incremental,
            worker_pool_size: self.compile.worker_pool_size,
            timeout: self.compile.timeout_secs.map(Duration::from_secs),
            options: self.option_settings(),
            report_diagnostic_counts: self.compile.report_diagnostic_counts,
            logger: self.compile.logger,
            compiler_main: self.compile.compiler_main.clone(),
        })
    }
}
