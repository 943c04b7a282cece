//! Sandbox - 一回の実行専用のディレクトリ
//!
//! # 学習ポイント
//! - `TempDir` guards own both directories; dropping `SandboxPaths` removes them
//! - staging is blocking filesystem work and runs under `spawn_blocking`
//! - the child talks back through two JSON mailbox files
//!
//! # ディレクトリ構成
//! ```text
//! $TMPDIR/sandrun-pkg-XXXX/   package のコピー (zip なら展開)
//! $TMPDIR/sandrun-wd-XXXX/    working dir
//!   ├── variables.json / secrets.json / RobotParser.py
//!   ├── task_variables.json / process_variables.json   (mailbox)
//!   ├── files/<variable>/<filename>                   (取得した File 変数)
//!   └── .cache/                                        (zip に同梱されていた場合)
//! ```

mod inputs;
mod stage;

pub use inputs::{
    DEFAULT_LOADER, LOADER_FILE, PROCESS_SCOPE_FILE, SECRETS_FILE, TASK_SCOPE_FILE,
    VARIABLES_FILE, write_inputs,
};
pub use stage::{DEFAULT_EXCLUSIONS, EXCLUSIONS_FILE, exclusions, prepare_sandbox};

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

use crate::ports::SecretsError;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("package archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("exclusion pattern: {0}")]
    Ignore(#[from] ignore::Error),

    #[error("walking package: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("secrets: {0}")]
    Secrets(#[from] SecretsError),

    #[error("staging task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SandboxError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| SandboxError::Io { path, source }
    }
}

/// The two mailbox files the child writes its results into.
///
/// 子プロセスには `BPMN_TASK_SCOPE` / `BPMN_PROCESS_SCOPE` で渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailboxes {
    pub task_scope: PathBuf,
    pub process_scope: PathBuf,
}

/// Package and working directory of one run.
///
/// Both directories are deleted when this value is dropped, whichever way
/// the run ends.
#[derive(Debug)]
pub struct SandboxPaths {
    package: TempDir,
    working: TempDir,
}

impl SandboxPaths {
    /// Create both directories under the system temp dir.
    pub fn create() -> Result<Self, SandboxError> {
        let tmp = std::env::temp_dir();
        let package = tempfile::Builder::new()
            .prefix("sandrun-pkg-")
            .tempdir()
            .map_err(SandboxError::io(&tmp))?;
        let working = tempfile::Builder::new()
            .prefix("sandrun-wd-")
            .tempdir()
            .map_err(SandboxError::io(&tmp))?;
        Ok(Self { package, working })
    }

    /// Staged package; the child's `--project` and suite source.
    pub fn package_dir(&self) -> &Path {
        self.package.path()
    }

    /// Inputs, mailboxes, fetched files and the child's output.
    pub fn working_dir(&self) -> &Path {
        self.working.path()
    }

    /// Mailbox locations, whether or not the files exist yet.
    pub fn mailboxes(&self) -> Mailboxes {
        Mailboxes {
            task_scope: self.working_dir().join(TASK_SCOPE_FILE),
            process_scope: self.working_dir().join(PROCESS_SCOPE_FILE),
        }
    }
}
