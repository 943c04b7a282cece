//! Task context (what the engine leased to us) and per-topic task configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::variable::VariableSet;

/// How a non-zero child exit is reported upstream.
///
/// Serialized as FAIL / COMPLETE / ERROR to match package manifests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomePolicy {
    /// Report a technical failure with zero retries left.
    #[default]
    Fail,
    /// Complete the task anyway, attaching error fields.
    Complete,
    /// Raise a business error the process model can catch.
    Error,
}

impl fmt::Display for OutcomePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomePolicy::Fail => "FAIL",
            OutcomePolicy::Complete => "COMPLETE",
            OutcomePolicy::Error => "ERROR",
        };
        f.write_str(s)
    }
}

impl FromStr for OutcomePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FAIL" => Ok(OutcomePolicy::Fail),
            "COMPLETE" => Ok(OutcomePolicy::Complete),
            "ERROR" => Ok(OutcomePolicy::Error),
            other => Err(format!("unknown on-fail policy: {other}")),
        }
    }
}

/// A locked external task as handed over by the work-leasing collaborator.
///
/// Read-only for the pipeline; one context is consumed by exactly one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    pub id: String,

    #[serde(default)]
    pub worker_id: String,

    #[serde(default)]
    pub execution_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_instance_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_expiration_time: Option<String>,

    #[serde(default)]
    pub variables: VariableSet,
}

/// Per-topic configuration, as declared in the package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TaskConfig {
    /// Suite/task name, or a fully-qualified function reference.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub include: Option<String>,

    #[serde(default)]
    pub exclude: Option<String>,

    /// Overrides the worker-wide policy when set.
    #[serde(default)]
    pub on_fail: Option<OutcomePolicy>,

    /// Whether the topic works on process-scope variables. Tells whoever
    /// leases tasks for this topic which variables to fetch.
    #[serde(default)]
    pub process_variables: bool,

    /// Extra module search paths, added before the sandbox directories.
    #[serde(default)]
    pub pythonpath: Vec<String>,
}

impl TaskConfig {
    /// The topic's own `on-fail`, else the worker-wide `default`.
    pub fn effective_policy(&self, default: OutcomePolicy) -> OutcomePolicy {
        self.on_fail.unwrap_or(default)
    }

    /// Variable scope a lease for this topic should fetch.
    pub fn lease_scope(&self) -> LeaseScope {
        if self.process_variables {
            LeaseScope::Process
        } else {
            LeaseScope::Local
        }
    }
}

/// Which variables the leasing side fetches along with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseScope {
    /// Only variables local to the task's execution.
    Local,
    /// Every variable visible from the process instance.
    Process,
}

impl fmt::Display for LeaseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LeaseScope::Local => "local",
            LeaseScope::Process => "process",
        })
    }
}
