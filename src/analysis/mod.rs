//! Source-level dependency analysis
//!
//! Parsing itself is delegated to a `SourceParser`; this module owns the
//! analysis record, its decoding contract and the fan-out over the files of a
//! compile unit.

mod command;
mod types;

pub use command::CommandParser;
pub use types::{JavaImport, JavaSourceDependencyAnalysis};

use crate::error::KilnResult;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// External parser producing the wire record for one file
#[async_trait]
pub trait SourceParser: Send + Sync {
    /// Parse source text and return the raw JSON wire record
    async fn parse(&self, path: &str, source: &[u8]) -> KilnResult<Vec<u8>>;
}

/// One analysed file
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub path: String,
    pub result: KilnResult<JavaSourceDependencyAnalysis>,
}

/// Runs the source parser and decodes its output
#[derive(Clone)]
pub struct DependencyAnalyzer {
    parser: Arc<dyn SourceParser>,
}

impl DependencyAnalyzer {
    pub fn new(parser: Arc<dyn SourceParser>) -> Self {
        Self { parser }
    }

    /// Analyse one file
    pub async fn analyze(&self, path: &str, source: &[u8]) -> KilnResult<JavaSourceDependencyAnalysis> {
        let wire = self.parser.parse(path, source).await?;
        JavaSourceDependencyAnalysis::from_wire_bytes(path, &wire)
    }

    /// Analyse many files concurrently
    ///
    /// A failure is recorded against its own file and never aborts siblings.
    /// Results come back in input order.
    pub async fn analyze_all(&self, files: &[(String, Vec<u8>)]) -> Vec<FileAnalysis> {
        let analyses = join_all(files.iter().map(|(path, source)| async move {
            FileAnalysis {
                path: path.clone(),
                result: self.analyze(path, source).await,
            }
        }))
        .await;

        for analysis in &analyses {
            match &analysis.result {
                Ok(record) => debug!(
                    "Analysed {}: {} import(s), {} type(s)",
                    analysis.path,
                    record.imports.len(),
                    record.top_level_types.len()
                ),
                Err(e) => warn!("{}", e),
            }
        }

        analyses
    }
}

/// Whether a path is a Java source the analyzer understands
pub fn is_java_source(path: &str) -> bool {
    path.ends_with(".java")
}
