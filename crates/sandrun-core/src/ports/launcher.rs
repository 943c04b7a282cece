//! ProcessLauncher port - runs one prepared command to completion.

use async_trait::async_trait;

use crate::domain::{ExecutionResult, SandrunError};
use crate::launch::CommandSpec;

/// Runs the child and waits for it. No timeout: the external lease is the ceiling.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start `command`, wait for it and capture both streams.
    ///
    /// A non-zero exit is an `Ok` result; only a failure to start (or to
    /// wait) is an error.
    async fn launch(&self, command: &CommandSpec) -> Result<ExecutionResult, SandrunError>;
}
