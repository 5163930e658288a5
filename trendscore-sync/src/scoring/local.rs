//! Scoring program run on this machine
//!
//! Averages go to a temporary input file; the program writes its result to
//! a temporary output file. Both paths, and the function name, are
//! substituted into the configured argument template.

use super::{format_input, parse_output, ScoringEngine, ScoringError};
use crate::aggregator::SeriesAverage;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tokio::process::Command;
use trendscore_common::config::LocalEngineConfig;

pub struct LocalEngine {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl LocalEngine {
    pub fn new(config: &LocalEngineConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    /// Argument list with placeholders filled in
    pub fn render_args(&self, function: &str, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{function}", function)
                    .replace("{input}", &input)
                    .replace("{output}", &output)
            })
            .collect()
    }
}

#[async_trait]
impl ScoringEngine for LocalEngine {
    async fn calculate(&self, function: &str, averages: &[SeriesAverage]) -> Result<f64, ScoringError> {
        let input = Builder::new().prefix("trendscore-input.").tempfile()?;
        let output = Builder::new().prefix("trendscore-output.").tempfile()?;
        tokio::fs::write(input.path(), format_input(averages)).await?;

        let mut command = Command::new(&self.program);
        command.args(self.render_args(function, input.path(), output.path()));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(program = %self.program, function, inputs = averages.len(), "Running scoring program");
        let result = command.output().await?;

        if !result.status.success() {
            return Err(ScoringError::ProcessFailed {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let text = tokio::fs::read_to_string(output.path()).await?;
        parse_output(&text)
    }
}
