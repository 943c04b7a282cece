//! SecretsProvider port - secrets material handed to the child.
//!
//! Only `read()` matters to the pipeline; where the material is stored
//! (file, vault, ...) is the provider's business.

use std::path::PathBuf;

use serde_json::{Map, Value};

/// Failure to produce the secrets document.
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("failed to read secrets from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("secrets in {path} are not a JSON object: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid secrets configuration: {0}")]
    Config(String),
}

/// Source of the flat secrets object written to `secrets.json`.
pub trait SecretsProvider: Send + Sync {
    /// Called once per run, on the blocking pool.
    fn read(&self) -> Result<Map<String, Value>, SecretsError>;
}
