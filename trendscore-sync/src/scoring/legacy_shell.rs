//! MATLAB on a remote host, driven over scp and ssh
//!
//! Steps: copy the input file to the host, run the function in a headless
//! MATLAB session, `cat` the output file back, remove both remote files.
//! A failed cleanup is logged and does not fail the score.

use super::{format_input, parse_output, ScoringEngine, ScoringError};
use crate::aggregator::SeriesAverage;
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tempfile::Builder;
use tokio::process::Command;
use trendscore_common::config::LegacyShellConfig;

pub struct LegacyShellEngine {
    config: LegacyShellConfig,
}

impl LegacyShellEngine {
    pub fn new(config: &LegacyShellConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// `scp <input> <host>:<remote_input>`
    pub fn copy_command(&self, local_input: &Path) -> Vec<String> {
        vec![
            self.config.scp_program.clone(),
            local_input.display().to_string(),
            format!("{}:{}", self.config.host, self.config.remote_input),
        ]
    }

    /// `ssh <host> matlab -nodisplay -nojvm -r "<script>"`
    pub fn run_command(&self, function: &str) -> Vec<String> {
        let script = [
            format!("fin='{}'", self.config.remote_input),
            format!("fout='{}'", self.config.remote_output),
            format!("cd {}", self.config.remote_workdir),
            format!("run('{}')", self.config.startup_script),
            format!("{}(fin,fout)", function),
            "exit".to_string(),
        ]
        .join(";");

        vec![
            self.config.ssh_program.clone(),
            self.config.host.clone(),
            "matlab".to_string(),
            "-nodisplay".to_string(),
            "-nojvm".to_string(),
            "-r".to_string(),
            format!("\"{}\"", script),
        ]
    }

    /// `ssh <host> cat <remote_output>`
    pub fn read_command(&self) -> Vec<String> {
        vec![
            self.config.ssh_program.clone(),
            self.config.host.clone(),
            "cat".to_string(),
            self.config.remote_output.clone(),
        ]
    }

    /// `ssh <host> rm <remote_input> <remote_output>`
    pub fn cleanup_command(&self) -> Vec<String> {
        vec![
            self.config.ssh_program.clone(),
            self.config.host.clone(),
            "rm".to_string(),
            self.config.remote_input.clone(),
            self.config.remote_output.clone(),
        ]
    }
}

/// Run one step, failing on a non-zero exit
async fn run_step(argv: &[String]) -> Result<Output, ScoringError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ScoringError::InvalidOutput("empty command".to_string()))?;

    let output = Command::new(program).args(args).output().await?;
    if !output.status.success() {
        return Err(ScoringError::ProcessFailed {
            program: program.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

#[async_trait]
impl ScoringEngine for LegacyShellEngine {
    async fn calculate(&self, function: &str, averages: &[SeriesAverage]) -> Result<f64, ScoringError> {
        let input = Builder::new().prefix("trendscore-input.").tempfile()?;
        tokio::fs::write(input.path(), format_input(averages)).await?;

        tracing::debug!(host = %self.config.host, "Sending averages to scoring host");
        run_step(&self.copy_command(input.path())).await?;
        drop(input);

        tracing::debug!(function, "Running remote scoring function");
        run_step(&self.run_command(function)).await?;

        let output = run_step(&self.read_command()).await?;
        let value = parse_output(&String::from_utf8_lossy(&output.stdout))?;

        if let Err(e) = run_step(&self.cleanup_command()).await {
            tracing::warn!(host = %self.config.host, error = %e, "Failed to remove remote scoring files");
        }

        Ok(value)
    }
}
