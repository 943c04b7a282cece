//! Command construction for the sandboxed child.
//!
//! The child is the task runner started through the package's own project
//! environment (`uv run --project <pkg> -- robot ...`). Everything it needs
//! is addressed by absolute paths inside the sandbox.
//!
//! # 組み立てられるコマンド
//! ```text
//! uv run --link-mode copy --project <pkg> [--offline --cache-dir <wd>/.cache] --
//!    robot [-t name] [-i include] [-e exclude]
//!          [--pythonpath extra]... --pythonpath <wd> --pythonpath <pkg>
//!          --parser RobotParser[.PythonParser:<module.function>]
//!          --variablefile RobotParser.Variables:variables.json:secrets.json
//!          --outputdir <wd> <pkg>
//! ```
//!
//! # 学習ポイント
//! - I/O は `.cache` の存在確認だけ (純粋関数に近いので test しやすい)
//! - mailbox の場所は引数ではなく環境変数で渡す

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::TaskConfig;
use crate::sandbox::{Mailboxes, SECRETS_FILE, VARIABLES_FILE};

pub const PROCESS_SCOPE_ENV: &str = "BPMN_PROCESS_SCOPE";
pub const TASK_SCOPE_ENV: &str = "BPMN_TASK_SCOPE";

/// Module name of the loader written next to the inputs.
const LOADER_MODULE: &str = "RobotParser";
const RUNNER_COMMAND: &str = "robot";
const CACHE_DIR: &str = ".cache";

static IDENTIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").ok());

/// A fully prepared child invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    /// Command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `module.path.function`: at least two dot-separated identifiers.
///
/// Every segment must be an identifier on its own, so `a.1b.c` and
/// `a.b-c.d` are rejected.
pub fn is_fully_qualified_function_reference(value: &str) -> bool {
    let Some(identifier) = IDENTIFIER.as_ref() else {
        return false;
    };
    let mut segments = 0;
    for segment in value.split('.') {
        if !identifier.is_match(segment) {
            return false;
        }
        segments += 1;
    }
    segments >= 2
}

// 非 UTF-8 の path は lossy で渡す (temp dir 配下なので実際には起きない)
fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Build the child command for one run.
///
/// `--offline --cache-dir` is only added when the package shipped a
/// `.cache` directory that was moved into the working dir.
pub fn build_command(
    config: &TaskConfig,
    program: &str,
    package_dir: &Path,
    working_dir: &Path,
    mailboxes: &Mailboxes,
) -> CommandSpec {
    let pkg = path_arg(package_dir);
    let wd = path_arg(working_dir);

    let mut args: Vec<String> = vec![
        "run".into(),
        "--link-mode".into(),
        "copy".into(),
        "--project".into(),
        pkg.clone(),
    ];

    let cache = working_dir.join(CACHE_DIR);
    if cache.is_dir() {
        args.extend(["--offline".into(), "--cache-dir".into(), path_arg(&cache)]);
    }

    args.extend(["--".into(), RUNNER_COMMAND.into()]);

    if let Some(name) = config.name.as_deref().filter(|n| !n.is_empty()) {
        args.extend(["-t".into(), name.to_string()]);
    }
    if let Some(include) = config.include.as_deref().filter(|s| !s.is_empty()) {
        args.extend(["-i".into(), include.to_string()]);
    }
    if let Some(exclude) = config.exclude.as_deref().filter(|s| !s.is_empty()) {
        args.extend(["-e".into(), exclude.to_string()]);
    }

    for p in &config.pythonpath {
        args.extend(["--pythonpath".into(), p.clone()]);
    }
    args.extend([
        "--pythonpath".into(),
        wd.clone(),
        "--pythonpath".into(),
        pkg.clone(),
    ]);

    // `module.function` 形式の name は Python 関数を直接実行する
    let parser = match config.name.as_deref() {
        Some(name) if is_fully_qualified_function_reference(name) => {
            format!("{LOADER_MODULE}.PythonParser:{name}")
        }
        _ => LOADER_MODULE.to_string(),
    };
    args.extend([
        "--parser".into(),
        parser,
        "--variablefile".into(),
        format!("{LOADER_MODULE}.Variables:{VARIABLES_FILE}:{SECRETS_FILE}"),
        "--outputdir".into(),
        wd,
        pkg,
    ]);

    let env = BTreeMap::from([
        (
            PROCESS_SCOPE_ENV.to_string(),
            path_arg(&mailboxes.process_scope),
        ),
        (TASK_SCOPE_ENV.to_string(), path_arg(&mailboxes.task_scope)),
        ("UV_NO_SYNC".to_string(), "0".to_string()),
        ("VIRTUAL_ENV".to_string(), String::new()),
        ("PYTHONPATH".to_string(), String::new()),
    ]);

    CommandSpec {
        program: program.to_string(),
        args,
        env,
        cwd: working_dir.to_path_buf(),
    }
}
