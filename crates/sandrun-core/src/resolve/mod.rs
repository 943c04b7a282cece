//! Resolver - 子プロセスの結果を TaskOutcome に変換する
//!
//! # 学習ポイント
//! - mailboxes are read once, after the child has exited
//! - a non-zero exit is routed through `OutcomePolicy`, never returned as an error
//! - the diagnostics push on the failure path is best-effort
//!
//! # フロー
//! 1. mailbox (task / process) を読んで encode
//! 2. inbound で型付きだった変数が null で返ってきたら型を引き継ぐ
//! 3. `log.html` / `output.xml` を File 変数として task scope に追加
//! 4. exit code と policy から [`TaskOutcome`] を決める
//!
//! | exit | policy   | outcome                                   |
//! |------|----------|-------------------------------------------|
//! | 0    | any      | Complete                                  |
//! | ≠0   | COMPLETE | Complete (+ errorCode / errorMessage)     |
//! | ≠0   | ERROR    | BusinessFault                             |
//! | ≠0   | FAIL     | TechnicalFailure (retries 0)              |

mod artifacts;
mod reason;

pub use artifacts::{LOG_HTML, OUTPUT_XML, attach_artifacts, data_uri, inline_images};
pub use reason::{fail_reason, fail_reason_in, split_reason};

use std::collections::BTreeMap;
use std::path::Path;

use crate::codec;
use crate::domain::{
    ExecutionResult, NativeMapping, NativeValue, OutcomePolicy, SandrunError, TaskOutcome,
    TypedVariable, ValueType, VariableSet,
};
use crate::ports::EngineClient;
use crate::sandbox::Mailboxes;

const ERROR_CODE: &str = "errorCode";
const ERROR_MESSAGE: &str = "errorMessage";
const UNKNOWN_ERROR: &str = "Unknown execution error";

/// Everything the resolver needs from one finished run.
pub struct Resolution<'a> {
    pub worker_id: &'a str,
    pub execution_id: &'a str,
    /// Inbound variables, for preserve-on-null.
    pub inbound: &'a VariableSet,
    pub package_dir: &'a Path,
    pub working_dir: &'a Path,
    pub mailboxes: &'a Mailboxes,
    pub result: &'a ExecutionResult,
    pub policy: OutcomePolicy,
}

/// Encoded mailboxes plus the failure reason read from the result document.
#[derive(Debug, Default)]
struct Collected {
    task: VariableSet,
    process: VariableSet,
    reason: String,
}

/// Turn a finished run into the outcome reported to the engine.
///
/// # Arguments
/// * `res` - 実行結果と sandbox の場所
/// * `engine` - 失敗時に report file を execution へ push するため
///
/// # Errors
/// mailbox が壊れている、または encode に失敗した場合だけ。
/// 子プロセスの失敗そのものは `Ok` の outcome になる。
pub async fn resolve(
    res: Resolution<'_>,
    engine: &dyn EngineClient,
) -> Result<TaskOutcome, SandrunError> {
    let collected = collect(&res).await?;
    Ok(decide(&res, collected, engine).await)
}

/// Read both mailboxes and the runner's reports out of the sandbox.
async fn collect(res: &Resolution<'_>) -> Result<Collected, SandrunError> {
    let package_dir = res.package_dir.to_path_buf();
    let working_dir = res.working_dir.to_path_buf();
    let mailboxes = res.mailboxes.clone();
    let inbound_types: BTreeMap<String, ValueType> = res
        .inbound
        .iter()
        .map(|(k, v)| (k.clone(), v.value_type))
        .collect();

    // file の読み書きが続くので blocking pool で
    tokio::task::spawn_blocking(move || {
        let roots = [package_dir.as_path(), working_dir.as_path()];
        let mut task = codec::encode_all(&read_mailbox(&mailboxes.task_scope)?, &roots)?;
        let mut process = codec::encode_all(&read_mailbox(&mailboxes.process_scope)?, &roots)?;
        preserve_types_on_null(&inbound_types, &mut task);
        preserve_types_on_null(&inbound_types, &mut process);

        attach_artifacts(&working_dir, &roots, &mut task)?;
        let reason = fail_reason(&working_dir.join(OUTPUT_XML));
        Ok::<_, SandrunError>(Collected {
            task,
            process,
            reason,
        })
    })
    .await?
}

/// A mailbox the child removed counts as empty.
fn read_mailbox(path: &Path) -> Result<NativeMapping, SandrunError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(NativeMapping::new()),
        Err(e) => return Err(e.into()),
    };
    match NativeValue::from(serde_json::from_str::<serde_json::Value>(&text)?) {
        NativeValue::Map(map) => Ok(map),
        NativeValue::Null => Ok(NativeMapping::new()),
        _ => Err(SandrunError::Mailbox {
            path: path.to_path_buf(),
            reason: "expected a JSON object".to_string(),
        }),
    }
}

/// An outbound null keeps the type the engine sent the variable in with.
fn preserve_types_on_null(inbound: &BTreeMap<String, ValueType>, outbound: &mut VariableSet) {
    for (name, var) in outbound.iter_mut() {
        if var.is_null()
            && let Some(ty) = inbound.get(name)
        {
            var.value_type = *ty;
        }
    }
}

/// 集めた結果と exit status から outcome を決める (table は module doc)
async fn decide(res: &Resolution<'_>, collected: Collected, engine: &dyn EngineClient) -> TaskOutcome {
    let Collected {
        mut task,
        process,
        reason,
    } = collected;
    let succeeded = res.result.succeeded();

    if succeeded || res.policy == OutcomePolicy::Complete {
        // Complete policy: 失敗も error 変数つきの完了として返す
        if !succeeded {
            let (code, message) = split_reason(&reason);
            task.insert(ERROR_CODE.to_string(), TypedVariable::string(code));
            task.insert(ERROR_MESSAGE.to_string(), TypedVariable::string(message));
        } else if res.policy == OutcomePolicy::Complete {
            task.insert(ERROR_CODE.to_string(), TypedVariable::null());
            task.insert(ERROR_MESSAGE.to_string(), TypedVariable::null());
        }
        return TaskOutcome::Complete {
            worker_id: res.worker_id.to_string(),
            local_variables: task,
            process_variables: process,
        };
    }

    // failure 側では local variables が捨てられるので report だけ先に送る
    push_diagnostics(res.execution_id, &task, engine).await;

    let reason = if reason.is_empty() {
        fallback_reason(res.result)
    } else {
        reason
    };

    match res.policy {
        OutcomePolicy::Error => {
            let (error_code, error_message) = split_reason(&reason);
            TaskOutcome::BusinessFault {
                worker_id: res.worker_id.to_string(),
                error_code,
                error_message,
                process_variables: process,
            }
        }
        _ => {
            // stdout → stderr の順で連結
            let mut details = res.result.stdout.clone();
            details.extend_from_slice(&res.result.stderr);
            TaskOutcome::technical_failure(
                res.worker_id,
                reason,
                String::from_utf8_lossy(&details),
            )
        }
    }
}

/// Reason used when the result document gives none: stderr, then stdout.
fn fallback_reason(result: &ExecutionResult) -> String {
    if !result.stderr.is_empty() {
        result.stderr_lossy()
    } else if !result.stdout.is_empty() {
        result.stdout_lossy()
    } else {
        UNKNOWN_ERROR.to_string()
    }
}

/// Push the runner's report files onto the execution so they survive the failure.
async fn push_diagnostics(execution_id: &str, task: &VariableSet, engine: &dyn EngineClient) {
    let modifications: VariableSet = [LOG_HTML, OUTPUT_XML]
        .into_iter()
        .filter_map(|name| task.get(name).map(|v| (name.to_string(), v.clone())))
        .collect();
    if modifications.is_empty() {
        return;
    }
    if let Err(e) = engine.patch_local_variables(execution_id, &modifications).await {
        tracing::warn!(execution_id, error = %e, "failed to attach diagnostics to execution");
    }
}
