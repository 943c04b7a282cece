//! FileSecretsProvider - secrets from a JSON document on disk.
//!
//! # 学習ポイント
//! - top level は JSON object でなければならない (array や string は `SecretsError::Parse`)
//! - cache しない。`read()` のたびに読み直す
//!
//! # 使用例
//! ```ignore
//! let secrets = FileSecretsProvider::new("/etc/sandrun/secrets.json").read()?;
//! ```

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::ports::{SecretsError, SecretsProvider};

/// Reads the file on every call so rotated secrets are picked up.
#[derive(Debug, Clone)]
pub struct FileSecretsProvider {
    path: PathBuf,
}

impl FileSecretsProvider {
    /// The file is not touched until the first `read()`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 設定された path (存在するとは限らない)
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretsProvider for FileSecretsProvider {
    fn read(&self) -> Result<Map<String, Value>, SecretsError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| SecretsError::Read {
            path: self.path.clone(),
            source,
        })?;
        let parse_error = |reason: String| SecretsError::Parse {
            path: self.path.clone(),
            reason,
        };
        match serde_json::from_str::<Value>(&text).map_err(|e| parse_error(e.to_string()))? {
            Value::Object(map) => Ok(map),
            other => Err(parse_error(format!("found {}", json_kind(&other)))),
        }
    }
}

/// Parse error 用の人間向けの型名
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
