//! WorkerSettings - プロセス全体の設定
//!
//! # 優先順位
//! 1. `SANDRUN_*` 環境変数
//! 2. TOML file (`--config`)
//! 3. [`WorkerSettings::default`]
//!
//! # 学習ポイント
//! - `deny_unknown_fields` で typo を load 時に検出する
//! - 環境変数の lookup は closure で注入する (test で `std::env` を触らない)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::OutcomePolicy;
use crate::sandbox::DEFAULT_LOADER;

use super::ConfigError;

pub const ENV_PREFIX: &str = "SANDRUN_";

const DEFAULT_BASE_URL: &str = "http://localhost:8080/engine-rest";
const DEFAULT_WORKER_ID: &str = "sandrun";
const DEFAULT_RUNNER: &str = "uv";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Process-wide settings; TOML keys are kebab-case (`max-jobs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct WorkerSettings {
    /// Engine REST root, e.g. `http://localhost:8080/engine-rest`.
    pub base_url: String,
    /// Sent verbatim as the `Authorization` header.
    pub authorization: Option<String>,
    pub worker_id: String,
    /// Simultaneous runs. At least 1.
    pub max_jobs: usize,
    /// Program that starts the child (`uv`).
    pub runner: String,
    /// Policy for topics that do not set `on-fail`.
    pub on_fail: OutcomePolicy,
    /// Secrets profile name, or a path to a JSON secrets file.
    pub secrets_profile: Option<String>,
    /// Replaces the built-in loader written into every working dir.
    pub loader: Option<PathBuf>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            authorization: None,
            worker_id: DEFAULT_WORKER_ID.to_string(),
            max_jobs: 1,
            runner: DEFAULT_RUNNER.to_string(),
            on_fail: OutcomePolicy::Fail,
            secrets_profile: None,
            loader: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl WorkerSettings {
    /// File (if any), then the process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a settings file without environment overrides or validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Missing keys take their defaults; unknown keys are rejected.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `SANDRUN_*` variables looked up through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        // 空文字は「未設定に戻す」扱い (Option の項目だけ)

        if let Some(v) = get("BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("AUTHORIZATION") {
            self.authorization = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = get("WORKER_ID") {
            self.worker_id = v;
        }
        if let Some(v) = get("MAX_JOBS") {
            self.max_jobs = v.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}MAX_JOBS"),
                reason: format!("{e}"),
            })?;
        }
        if let Some(v) = get("RUNNER") {
            self.runner = v;
        }
        if let Some(v) = get("ON_FAIL") {
            self.on_fail = v.parse().map_err(|reason| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}ON_FAIL"),
                reason,
            })?;
        }
        if let Some(v) = get("SECRETS_PROFILE") {
            self.secrets_profile = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = get("LOADER") {
            self.loader = Some(PathBuf::from(v)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    /// `max-jobs` ≥ 1 and no blank required strings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.max_jobs < 1 {
            return Err(invalid("max-jobs", "must be at least 1"));
        }
        for (key, value) in [
            ("base-url", &self.base_url),
            ("worker-id", &self.worker_id),
            ("runner", &self.runner),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(key, "must not be empty"));
            }
        }
        Ok(())
    }

    /// Loader source: the configured override, or the built-in loader.
    pub fn loader_source(&self) -> Result<String, ConfigError> {
        let Some(path) = &self.loader else {
            return Ok(DEFAULT_LOADER.to_string());
        };
        std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })
    }
}
