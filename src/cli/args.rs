//! CLI argument definitions using clap derive

use crate::compile::ExecutionStrategy;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Kiln - incremental JVM compiler driver
///
/// Compiles Java/Scala units against a content-verified classpath inside a
/// reusable JDK sandbox, caching results by content digest.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile the units described by a JSON file
    Compile(CompileArgs),

    /// Decode a dependency-analysis wire record
    Analyze(AnalyzeArgs),

    /// Work with pinned dependency lockfiles
    Lockfile(LockfileArgs),

    /// Manage local compile caches
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the compile command
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// JSON file listing the units to compile
    pub units: PathBuf,

    /// Lockfile pinning third-party coordinates
    #[arg(short, long)]
    pub lockfile: Option<PathBuf>,

    /// Directory holding the pinned jars (defaults to the units file's directory)
    #[arg(short, long)]
    pub jars: Option<PathBuf>,

    /// JDK to compile with ("system" or a managed version)
    #[arg(long)]
    pub jdk: Option<String>,

    /// Override the configured execution strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Print diagnostic counts for every unit
    #[arg(long)]
    pub report_diagnostic_counts: bool,
}

/// Execution strategy as a CLI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Persistent,
    Hermetic,
}

impl From<StrategyArg> for ExecutionStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Persistent => ExecutionStrategy::Persistent,
            StrategyArg::Hermetic => ExecutionStrategy::Hermetic,
        }
    }
}

/// Arguments for the analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// File holding one JSON wire record
    pub file: PathBuf,

    /// Print the wire (camelCase) form instead of the debug view
    #[arg(long)]
    pub wire: bool,
}

/// Arguments for the lockfile command
#[derive(Parser, Debug)]
pub struct LockfileArgs {
    #[command(subcommand)]
    pub action: LockfileAction,
}

/// Lockfile subcommands
#[derive(Subcommand, Debug)]
pub enum LockfileAction {
    /// Check every pinned jar against its digest
    Verify {
        /// Lockfile to verify
        lockfile: PathBuf,

        /// Directory holding the jars, by file name
        #[arg(short, long)]
        dir: PathBuf,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Plain text (one item per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List entries in the local cache directories
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove every entry from the local cache directories
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
