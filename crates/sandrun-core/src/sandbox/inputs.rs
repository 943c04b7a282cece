//! Input files handed to the child.

use std::path::Path;

use crate::domain::NativeMapping;
use crate::ports::SecretsProvider;

use super::{Mailboxes, SandboxError};

pub const VARIABLES_FILE: &str = "variables.json";
pub const SECRETS_FILE: &str = "secrets.json";
pub const LOADER_FILE: &str = "RobotParser.py";
pub const TASK_SCOPE_FILE: &str = "task_variables.json";
pub const PROCESS_SCOPE_FILE: &str = "process_variables.json";

const EMPTY_MAILBOX: &str = "{}";

/// Loader shipped with the worker: the parsers (`RobotParser`,
/// `RobotParser.PythonParser`) and the `RobotParser.Variables` variable file
/// that every child command refers to.
pub const DEFAULT_LOADER: &str = include_str!("../../resources/RobotParser.py");

/// Write variables, secrets, the loader and two empty mailboxes.
///
/// # 含まれるファイル
/// - `variables.json`: decode 済みの入力変数
/// - `secrets.json`: secrets provider の中身 (なければ `{}`)
/// - `RobotParser.py`: loader (通常は [`DEFAULT_LOADER`])
/// - `task_variables.json` / `process_variables.json`: 空の mailbox
pub fn write_inputs(
    variables: &NativeMapping,
    secrets: Option<&dyn SecretsProvider>,
    loader: &str,
    working_dir: &Path,
) -> Result<Mailboxes, SandboxError> {
    write(working_dir, VARIABLES_FILE, &serde_json::to_string(variables)?)?;

    let secrets = match secrets {
        Some(provider) => provider.read()?,
        None => serde_json::Map::new(),
    };
    write(working_dir, SECRETS_FILE, &serde_json::to_string(&secrets)?)?;

    write(working_dir, LOADER_FILE, loader)?;

    let mailboxes = Mailboxes {
        task_scope: write(working_dir, TASK_SCOPE_FILE, EMPTY_MAILBOX)?,
        process_scope: write(working_dir, PROCESS_SCOPE_FILE, EMPTY_MAILBOX)?,
    };
    Ok(mailboxes)
}

fn write(dir: &Path, name: &str, contents: &str) -> Result<std::path::PathBuf, SandboxError> {
    let path = dir.join(name);
    std::fs::write(&path, contents).map_err(SandboxError::io(&path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NativeValue;
    use crate::ports::SecretsError;
    use serde_json::{Value, json};

    struct Fixed(Value);

    impl SecretsProvider for Fixed {
        fn read(&self) -> Result<serde_json::Map<String, Value>, SecretsError> {
            Ok(self.0.as_object().cloned().unwrap_or_default())
        }
    }

    struct Broken;

    impl SecretsProvider for Broken {
        fn read(&self) -> Result<serde_json::Map<String, Value>, SecretsError> {
            Err(SecretsError::Config("nope".into()))
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn writes_every_input_file() {
        let wd = tempfile::tempdir().unwrap();
        let vars = NativeMapping::from([
            ("n".to_string(), NativeValue::Int(1)),
            ("s".to_string(), NativeValue::from("x")),
        ]);
        let secrets = Fixed(json!({"token": "t0p"}));

        let m = write_inputs(&vars, Some(&secrets), "# loader", wd.path()).unwrap();

        assert_eq!(read_json(&wd.path().join(VARIABLES_FILE)), json!({"n": 1, "s": "x"}));
        assert_eq!(read_json(&wd.path().join(SECRETS_FILE)), json!({"token": "t0p"}));
        assert_eq!(
            std::fs::read_to_string(wd.path().join(LOADER_FILE)).unwrap(),
            "# loader"
        );
        assert_eq!(read_json(&m.task_scope), json!({}));
        assert_eq!(read_json(&m.process_scope), json!({}));
    }

    #[test]
    fn secrets_default_to_empty_and_default_loader_is_written() {
        let wd = tempfile::tempdir().unwrap();
        write_inputs(&NativeMapping::new(), None, DEFAULT_LOADER, wd.path()).unwrap();

        assert_eq!(read_json(&wd.path().join(SECRETS_FILE)), json!({}));
        let loader = std::fs::read_to_string(wd.path().join(LOADER_FILE)).unwrap();
        for name in ["class RobotParser", "class PythonParser", "class Variables"] {
            assert!(loader.contains(name), "loader lacks {name}");
        }
    }

    #[test]
    fn secrets_errors_propagate() {
        let wd = tempfile::tempdir().unwrap();
        let err = write_inputs(&NativeMapping::new(), Some(&Broken), DEFAULT_LOADER, wd.path()).unwrap_err();
        assert!(matches!(err, SandboxError::Secrets(_)));
    }
}
