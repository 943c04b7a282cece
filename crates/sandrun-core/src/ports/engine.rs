//! EngineClient port - the two REST calls the pipeline makes itself.
//!
//! Leasing, completing and failing tasks belong to the work-leasing
//! collaborator; the pipeline only downloads file payloads and, on the
//! failure path, pushes diagnostics back as local variables.

use async_trait::async_trait;

use crate::domain::VariableSet;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("engine returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Raw payload of a File/Bytes variable of an execution.
    async fn fetch_variable_data(
        &self,
        execution_id: &str,
        name: &str,
    ) -> Result<Vec<u8>, EngineError>;

    /// Set local variables on an execution without touching the task state.
    async fn patch_local_variables(
        &self,
        execution_id: &str,
        modifications: &VariableSet,
    ) -> Result<(), EngineError>;
}
