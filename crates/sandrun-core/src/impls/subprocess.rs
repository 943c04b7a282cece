//! SubprocessLauncher - runs the child with tokio::process.
//!
//! # 学習ポイント
//! - stdin は null (子が入力待ちで止まらないように)
//! - `kill_on_drop(true)`: run の future が捨てられたら子も止める
//! - 出力は trace の debug level にだけ流す (secrets が混ざりうる)

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::{ExecutionResult, SandrunError};
use crate::launch::CommandSpec;
use crate::ports::ProcessLauncher;

/// Waits for the child to exit, capturing both streams in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessLauncher;

impl SubprocessLauncher {
    /// Stateless; one instance serves every run.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for SubprocessLauncher {
    async fn launch(&self, command: &CommandSpec) -> Result<ExecutionResult, SandrunError> {
        tracing::debug!(command = %command.display(), cwd = %command.cwd.display(), "launching child");

        let output = Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .current_dir(&command.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SandrunError::Launch {
                program: command.program.clone(),
                source,
            })?;

        // signal で終わった場合 code() は None
        let result = ExecutionResult::new(output.status.code(), &output.stdout, &output.stderr);
        if !result.stderr.is_empty() {
            tracing::debug!(stderr = %result.stderr_lossy(), "child stderr");
        }
        if !result.stdout.is_empty() {
            tracing::debug!(stdout = %result.stdout_lossy(), "child stdout");
        }
        tracing::debug!(exit_code = result.exit_code, "child exited");
        Ok(result)
    }
}
