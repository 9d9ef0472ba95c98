//! Source parser backed by an external command

use super::SourceParser;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Runs `argv` once per file, writing the source to stdin and reading the
/// wire record from stdout
///
/// The file's path is exported as `KILN_SOURCE_PATH`.
pub struct CommandParser {
    argv: Vec<String>,
}

impl CommandParser {
    pub fn new(argv: Vec<String>) -> KilnResult<Self> {
        if argv.is_empty() {
            return Err(KilnError::config("analysis.parser_command must not be empty"));
        }
        Ok(Self { argv })
    }
}

#[async_trait]
impl SourceParser for CommandParser {
    async fn parse(&self, path: &str, source: &[u8]) -> KilnResult<Vec<u8>> {
        let description = format!("Analyze {}", path);
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| KilnError::process(&description, "empty argv"))?;

        debug!("Parsing {} with {:?}", path, self.argv);
        let mut child = Command::new(program)
            .args(args)
            .env("KILN_SOURCE_PATH", path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KilnError::process(&description, e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source)
                .await
                .map_err(|e| KilnError::process(&description, e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| KilnError::process(&description, e.to_string()))?;

        if !output.status.success() {
            return Err(KilnError::MalformedAnalysis {
                path: path.to_string(),
                reason: format!(
                    "parser exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output.stdout)
    }
}
