//! Configuration: worker settings and package manifests.
//!
//! - **WorkerSettings**: one per process. TOML file, then `SANDRUN_*`
//!   environment overrides, then validation.
//! - **PackageManifest**: the `[tool.sandrun]` table of a package's
//!   `pyproject.toml`, read from a directory or a zip archive.
//!
//! # 使用例
//! ```ignore
//! let settings = WorkerSettings::load(Some(Path::new("sandrun.toml")))?;
//! let manifest = PackageManifest::load(Path::new("robots.zip"))?;
//! for (topic, config) in &manifest.topics {
//!     println!("{topic}: {}", config.effective_policy(settings.on_fail));
//! }
//! ```

mod manifest;
mod settings;

pub use manifest::{MANIFEST_FILE, PackageManifest, SecretsEntry, resolve_secrets};
pub use settings::{ENV_PREFIX, WorkerSettings};

use std::path::PathBuf;

use thiserror::Error;

/// Errors while reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("package archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
