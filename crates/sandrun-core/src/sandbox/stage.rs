//! Copying a package (directory or zip archive) into a sandbox.
//!
//! # 学習ポイント
//! - 除外は `ignore` crate の gitignore matcher (package の `.wrapignore` + 既定値)
//! - `filter_entry` で除外 directory の中には降りない
//! - zip は除外なしでそのまま展開する (作る側で除外済みのため)

use std::fs::File;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use walkdir::WalkDir;

use super::{SandboxError, SandboxPaths};

/// Package-local exclusion file, gitignore syntax.
pub const EXCLUSIONS_FILE: &str = ".wrapignore";

/// Always excluded when staging a directory package.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "/.git",
    "/.devenv",
    "/.gitignore",
    "/log.html",
    "/output.xml",
    "__pycache__/",
    "/report.html",
    "/robot.zip",
    "/.venv/",
    "/.wrapignore",
    "/.cache",
];

/// Archive に同梱される offline install 用の cache
const CACHE_DIR: &str = ".cache";

/// Exclusion matcher for a directory package: its own `.wrapignore`
/// followed by the defaults.
pub fn exclusions(source: &Path) -> Result<Gitignore, SandboxError> {
    // package 自身の pattern が先、default は後から足す
    let mut builder = GitignoreBuilder::new(source);
    let own = source.join(EXCLUSIONS_FILE);
    if own.is_file() {
        let text = std::fs::read_to_string(&own).map_err(SandboxError::io(&own))?;
        for line in text.lines() {
            builder.add_line(Some(own.clone()), line)?;
        }
    }
    for pattern in DEFAULT_EXCLUSIONS {
        builder.add_line(None, pattern)?;
    }
    Ok(builder.build()?)
}

/// Stage `source` into the sandbox.
///
/// A directory is copied file by file, skipping excluded entries. Anything
/// else is treated as a zip archive: it is extracted whole, and a bundled
/// `.cache` directory is moved into the working directory.
pub async fn prepare_sandbox(source: &Path, paths: &SandboxPaths) -> Result<(), SandboxError> {
    let source = source.to_path_buf();
    let package = paths.package_dir().to_path_buf();
    let working = paths.working_dir().to_path_buf();
    tokio::task::spawn_blocking(move || {
        if source.is_dir() {
            let matcher = exclusions(&source)?;
            copy_tree(&source, &package, &matcher)
        } else {
            extract_archive(&source, &package, &working)
        }
    })
    .await?
}

/// Copy the non-excluded files of `source` into `dest`, keeping layout.
fn copy_tree(source: &Path, dest: &Path, matcher: &Gitignore) -> Result<(), SandboxError> {
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !matcher
                    .matched(entry.path(), entry.file_type().is_dir())
                    .is_ignore()
        });

    let mut copied = 0usize;
    for entry in walker {
        let entry = entry?;
        // symlinked files are copied by content, everything else non-file is skipped
        if !entry.path().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .unwrap_or_else(|_| entry.path());
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(SandboxError::io(parent))?;
        }
        std::fs::copy(entry.path(), &target).map_err(SandboxError::io(&target))?;
        copied += 1;
    }
    tracing::debug!(source = %source.display(), files = copied, "staged package directory");
    Ok(())
}

/// Extract `source` into `package`; a bundled `.cache` moves to `working`
/// so the child can install offline.
fn extract_archive(source: &Path, package: &Path, working: &Path) -> Result<(), SandboxError> {
    let file = File::open(source).map_err(SandboxError::io(source))?;
    let mut archive = zip::ZipArchive::new(file)?;
    // entry 名の `..` や絶対 path は zip crate 側で弾かれる
    archive.extract(package)?;

    let cache: PathBuf = package.join(CACHE_DIR);
    if cache.is_dir() {
        let target = working.join(CACHE_DIR);
        std::fs::rename(&cache, &target).map_err(SandboxError::io(&target))?;
    }
    tracing::debug!(source = %source.display(), entries = archive.len(), "extracted package archive");
    Ok(())
}
