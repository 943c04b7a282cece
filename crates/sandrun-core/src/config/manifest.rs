//! Package manifest (`[tool.sandrun]` in `pyproject.toml`) and secrets profiles.
//!
//! # 使用例
//! ```toml
//! [tool.sandrun.topics."Send Invoice"]
//! name = "Send invoice"
//! on-fail = "ERROR"
//! pythonpath = ["lib"]
//!
//! [tool.sandrun.secrets.default]
//! provider = "file"
//! path = "secrets.json"
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::domain::TaskConfig;
use crate::impls::FileSecretsProvider;
use crate::ports::{SecretsError, SecretsProvider};

use super::ConfigError;

pub const MANIFEST_FILE: &str = "pyproject.toml";

const DEFAULT_PROFILE: &str = "default";

/// The `[tool.sandrun]` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PackageManifest {
    /// topic name -> task configuration
    #[serde(default)]
    pub topics: BTreeMap<String, TaskConfig>,

    /// profile name -> provider configuration
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretsEntry>,
}

/// One secrets profile, tagged by `provider`.
///
/// Vault profiles parse, so a package declaring one still loads, but
/// selecting one is an error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum SecretsEntry {
    File {
        path: PathBuf,
    },
    Vault {
        path: String,
        #[serde(rename = "mount-point")]
        mount_point: String,
    },
}

// pyproject.toml のうち読むのは [tool.sandrun] だけ
#[derive(Deserialize, Default)]
struct Pyproject {
    #[serde(default)]
    tool: Tools,
}

#[derive(Deserialize, Default)]
struct Tools {
    #[serde(default)]
    sandrun: Option<PackageManifest>,
}

impl PackageManifest {
    /// Read the manifest of a package directory or zip archive.
    ///
    /// A package without a `[tool.sandrun]` table has no topics.
    pub fn load(package: &Path) -> Result<Self, ConfigError> {
        let text = if package.is_dir() {
            let path = package.join(MANIFEST_FILE);
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })?
        } else {
            read_from_archive(package)?
        };
        Self::from_pyproject(&text)
    }

    /// Parse the `[tool.sandrun]` table out of a whole `pyproject.toml`.
    pub fn from_pyproject(text: &str) -> Result<Self, ConfigError> {
        let pyproject: Pyproject = toml::from_str(text)?;
        Ok(pyproject.tool.sandrun.unwrap_or_default())
    }
}

fn read_from_archive(archive: &Path) -> Result<String, ConfigError> {
    let read_err = |source| ConfigError::Read {
        path: archive.join(MANIFEST_FILE),
        source,
    };
    let file = std::fs::File::open(archive).map_err(|source| ConfigError::Read {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut entry = zip.by_name(MANIFEST_FILE)?;
    let mut text = String::new();
    entry.read_to_string(&mut text).map_err(read_err)?;
    Ok(text)
}

/// Pick the secrets provider for a package.
///
/// A `profile` naming an existing file wins outright. Otherwise a single
/// configured entry is used regardless of name, else the named profile
/// (or `default`) must exist.
pub fn resolve_secrets(
    entries: &BTreeMap<String, SecretsEntry>,
    profile: Option<&str>,
) -> Result<Option<Arc<dyn SecretsProvider>>, SecretsError> {
    if let Some(p) = profile
        && Path::new(p).is_file()
    {
        return Ok(Some(Arc::new(FileSecretsProvider::new(p))));
    }
    if entries.is_empty() {
        return Ok(None);
    }

    // 1 つしかなければ名前は問わない
    let entry = if entries.len() == 1 {
        entries.values().next()
    } else {
        let name = profile.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PROFILE);
        entries.get(name)
    };
    let Some(entry) = entry else {
        let available: Vec<&str> = entries.keys().map(String::as_str).collect();
        return Err(SecretsError::Config(format!(
            "profile '{}' not found, available profiles: {}",
            profile.unwrap_or(DEFAULT_PROFILE),
            available.join(", ")
        )));
    };

    match entry {
        SecretsEntry::File { path } => Ok(Some(Arc::new(FileSecretsProvider::new(path)))),
        SecretsEntry::Vault { .. } => Err(SecretsError::Config(
            "vault secrets are not supported by this worker".to_string(),
        )),
    }
}
