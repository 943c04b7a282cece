//! Outcome model: what a child run produced and what we report upstream.
//!
//! This module is pipeline-agnostic: it does not know how the child was
//! launched or how the result reaches the engine. It only defines the
//! "shape" of results.

use serde::{Deserialize, Serialize};

use super::variable::VariableSet;

/// Exit status and captured streams of one child process.
///
/// Both streams are whitespace-trimmed. An absent exit status (killed by a
/// signal) is recorded as 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecutionResult {
    pub fn new(exit_code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            exit_code: exit_code.unwrap_or(0),
            stdout: stdout.trim_ascii().to_vec(),
            stderr: stderr.trim_ascii().to_vec(),
        }
    }

    /// Exit status 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Classification of a resolved run.
///
/// Serialized as COMPLETE / BUSINESS_FAULT / TECHNICAL_FAILURE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Complete,
    BusinessFault,
    TechnicalFailure,
}

/// The report for one task, ready to be handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum TaskOutcome {
    /// Task completed; variables are written back at both scopes.
    Complete {
        worker_id: String,
        local_variables: VariableSet,
        process_variables: VariableSet,
    },

    /// A business error the process model may catch (boundary event).
    BusinessFault {
        worker_id: String,
        error_code: String,
        error_message: String,
        process_variables: VariableSet,
    },

    /// A technical failure. We never ask the engine to retry.
    TechnicalFailure {
        worker_id: String,
        error_message: String,
        error_details: String,
        retries: u32,
        retry_timeout: u64,
    },
}

impl TaskOutcome {
    /// Variant name without the payload, for logs and assertions.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            TaskOutcome::Complete { .. } => OutcomeKind::Complete,
            TaskOutcome::BusinessFault { .. } => OutcomeKind::BusinessFault,
            TaskOutcome::TechnicalFailure { .. } => OutcomeKind::TechnicalFailure,
        }
    }

    pub fn technical_failure(
        worker_id: impl Into<String>,
        error_message: impl Into<String>,
        error_details: impl Into<String>,
    ) -> Self {
        TaskOutcome::TechnicalFailure {
            worker_id: worker_id.into(),
            error_message: error_message.into(),
            error_details: error_details.into(),
            retries: 0,
            retry_timeout: 0,
        }
    }
}
