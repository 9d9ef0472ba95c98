//! Analyze command - decode a dependency-analysis wire record

use crate::analysis::JavaSourceDependencyAnalysis;
use crate::cli::args::AnalyzeArgs;
use crate::error::{KilnError, KilnResult};
use std::path::Path;
use tokio::fs;

/// Execute the analyze command
pub async fn execute(args: AnalyzeArgs) -> KilnResult<()> {
    let analysis = load(&args.file).await?;
    let view = if args.wire {
        analysis.to_wire_json()
    } else {
        analysis.to_debug_json()?
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

async fn load(path: &Path) -> KilnResult<JavaSourceDependencyAnalysis> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| KilnError::io(format!("reading {}", path.display()), e))?;
    JavaSourceDependencyAnalysis::from_wire_bytes(&path.display().to_string(), &bytes)
}
