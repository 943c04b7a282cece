//! TaskRunner - 1 topic 分のパイプライン
//!
//! permit → sandbox → decode (+fetch) → stage → inputs → launch → resolve
//!
//! The permit is taken before the sandbox exists and dropped after it is
//! gone, so at most `max_jobs` sandboxes are ever alive at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::Instrument;

use crate::codec::{self, FileFetch};
use crate::domain::{
    NativeValue, OutcomePolicy, RunId, SandrunError, TaskConfig, TaskContext, TaskOutcome,
};
use crate::governor::Governor;
use crate::launch::build_command;
use crate::ports::{EngineClient, ProcessLauncher, SecretsProvider};
use crate::resolve::{Resolution, resolve};
use crate::sandbox::{SandboxPaths, prepare_sandbox, write_inputs};

/// Scope markers handed to the child so it can address both mailboxes.
pub const PROCESS_SCOPE_MARKER: &str = "BPMN:PROCESS";
pub const TASK_SCOPE_MARKER: &str = "BPMN:TASK";

/// Collaborators shared by every runner of a worker.
pub struct RunnerDeps {
    pub governor: Governor,
    pub engine: Arc<dyn EngineClient>,
    pub launcher: Arc<dyn ProcessLauncher>,
    /// Program that starts the child.
    pub program: String,
    /// Used when the task context carries no worker id.
    pub worker_id: String,
    /// Loader source written into every working dir.
    pub loader: String,
}

/// TaskRunner は 1 topic の設定と共有依存を束ねる
///
/// - `config` / `policy` は build 時に manifest と settings から確定済み
/// - `secrets` は package ごと (同じ package の topic 間で共有)
pub struct TaskRunner {
    topic: String,
    package: PathBuf,
    config: TaskConfig,
    policy: OutcomePolicy,
    secrets: Option<Arc<dyn SecretsProvider>>,
    deps: Arc<RunnerDeps>,
}

impl TaskRunner {
    pub fn new(
        topic: impl Into<String>,
        package: impl Into<PathBuf>,
        config: TaskConfig,
        policy: OutcomePolicy,
        secrets: Option<Arc<dyn SecretsProvider>>,
        deps: Arc<RunnerDeps>,
    ) -> Self {
        Self {
            topic: topic.into(),
            package: package.into(),
            config,
            policy,
            secrets,
            deps,
        }
    }

    /// Topic this runner serves.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Package source (directory or archive), absolute.
    pub fn package(&self) -> &Path {
        &self.package
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn policy(&self) -> OutcomePolicy {
        self.policy
    }

    /// Run one task through the whole pipeline.
    ///
    /// A failing child is an `Ok` outcome; `Err` means no outcome could be
    /// produced (staging, launch or codec trouble).
    pub async fn execute(&self, task: &TaskContext) -> Result<TaskOutcome, SandrunError> {
        let run_id = RunId::new();
        let span = tracing::info_span!("run", %run_id, topic = %self.topic, task_id = %task.id);
        self.run(task).instrument(span).await
    }

    async fn run(&self, task: &TaskContext) -> Result<TaskOutcome, SandrunError> {
        // permit は sandbox より先に取り、sandbox より後に drop される
        let _permit = self.deps.governor.acquire().await?;
        tracing::info!(active = self.deps.governor.active(), "run started");

        let paths = SandboxPaths::create()?;

        let fetch = FileFetch {
            engine: self.deps.engine.as_ref(),
            execution_id: &task.execution_id,
            destination: paths.working_dir(),
        };
        // File 変数はここで working dir に取得される
        let mut variables = codec::decode(&task.variables, Some(fetch)).await?;
        for marker in [PROCESS_SCOPE_MARKER, TASK_SCOPE_MARKER] {
            variables.insert(marker.to_string(), NativeValue::from(marker));
        }

        prepare_sandbox(&self.package, &paths).await?;

        let secrets = self.secrets.clone();
        let loader = self.deps.loader.clone();
        let working_dir = paths.working_dir().to_path_buf();
        let mailboxes = tokio::task::spawn_blocking(move || {
            write_inputs(&variables, secrets.as_deref(), &loader, &working_dir)
        })
        .await??;

        let command = build_command(
            &self.config,
            &self.deps.program,
            paths.package_dir(),
            paths.working_dir(),
            &mailboxes,
        );
        let result = self.deps.launcher.launch(&command).await?;

        // lease 側が worker id を入れてこなければ設定値
        let worker_id = if task.worker_id.is_empty() {
            self.deps.worker_id.as_str()
        } else {
            task.worker_id.as_str()
        };
        let outcome = resolve(
            Resolution {
                worker_id,
                execution_id: &task.execution_id,
                inbound: &task.variables,
                package_dir: paths.package_dir(),
                working_dir: paths.working_dir(),
                mailboxes: &mailboxes,
                result: &result,
                policy: self.policy,
            },
            self.deps.engine.as_ref(),
        )
        .await?;

        tracing::info!(kind = ?outcome.kind(), exit_code = result.exit_code, "run finished");
        Ok(outcome)
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("topic", &self.topic)
            .field("package", &self.package)
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("secrets", &self.secrets.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{RecordingEngine, ScriptedLauncher, deps, package_dir};
    use crate::domain::{OutcomeKind, TypedVariable, ValueType, VariableSet};
    use crate::launch::{PROCESS_SCOPE_ENV, TASK_SCOPE_ENV};
    use std::time::Duration;

    fn runner(
        pkg: &Path,
        policy: OutcomePolicy,
        engine: Arc<RecordingEngine>,
        launcher: Arc<ScriptedLauncher>,
        limit: usize,
    ) -> TaskRunner {
        TaskRunner::new(
            "Send Invoice",
            pkg,
            TaskConfig {
                name: Some("Send invoice".into()),
                ..TaskConfig::default()
            },
            policy,
            None,
            deps(limit, engine, launcher),
        )
    }

    fn task(variables: VariableSet) -> TaskContext {
        TaskContext {
            id: "t-1".into(),
            worker_id: "w-1".into(),
            execution_id: "e-1".into(),
            topic_name: Some("Send Invoice".into()),
            variables,
            ..TaskContext::default()
        }
    }

    #[tokio::test]
    async fn successful_run_returns_the_mailbox_and_cleans_up() {
        let pkg = package_dir();
        let launcher = Arc::new(ScriptedLauncher::new(0, r#"{"answer": 42, "note": "done"}"#));
        let r = runner(
            pkg.path(),
            OutcomePolicy::Fail,
            Arc::default(),
            Arc::clone(&launcher),
            1,
        );

        let outcome = r.execute(&task(VariableSet::new())).await.unwrap();
        let TaskOutcome::Complete {
            worker_id,
            local_variables,
            ..
        } = outcome
        else {
            panic!("expected Complete");
        };
        assert_eq!(worker_id, "w-1");
        assert_eq!(local_variables["answer"].value_type, ValueType::Integer);
        assert_eq!(local_variables["note"].value, "done");

        let commands = launcher.commands.lock().unwrap();
        let cmd = &commands[0];
        assert_eq!(cmd.program, "uv");
        assert!(cmd.env[TASK_SCOPE_ENV].ends_with(crate::sandbox::TASK_SCOPE_FILE));
        assert!(cmd.env.contains_key(PROCESS_SCOPE_ENV));
        assert!(!cmd.cwd.exists(), "working dir should be gone after the run");
    }

    #[tokio::test]
    async fn inputs_carry_scope_markers_and_fetched_files() {
        let pkg = package_dir();
        let engine = Arc::new(RecordingEngine {
            files: [("invoice".to_string(), b"%PDF".to_vec())].into(),
            ..RecordingEngine::default()
        });
        let launcher = Arc::new(ScriptedLauncher::new(0, "{}"));
        let r = runner(pkg.path(), OutcomePolicy::Fail, engine, Arc::clone(&launcher), 1);

        let mut vars = VariableSet::new();
        vars.insert("count".into(), TypedVariable::integer(3));
        vars.insert(
            "invoice".into(),
            TypedVariable::file(b"", "invoice.pdf", "application/pdf"),
        );
        r.execute(&task(vars)).await.unwrap();

        let inputs = launcher.inputs.lock().unwrap();
        let seen = &inputs[0];
        assert_eq!(seen["count"], 3);
        assert_eq!(seen[PROCESS_SCOPE_MARKER], PROCESS_SCOPE_MARKER);
        assert_eq!(seen[TASK_SCOPE_MARKER], TASK_SCOPE_MARKER);
        assert!(seen["invoice"].as_str().unwrap().ends_with("invoice.pdf"));
    }

    #[tokio::test]
    async fn failing_child_becomes_a_technical_failure() {
        let pkg = package_dir();
        let launcher = Arc::new(ScriptedLauncher::new(1, "{}"));
        let r = runner(pkg.path(), OutcomePolicy::Fail, Arc::default(), launcher, 1);

        // no worker id on the task: the configured one is used
        let mut t = task(VariableSet::new());
        t.worker_id.clear();
        let outcome = r.execute(&t).await.unwrap();
        assert_eq!(outcome.kind(), OutcomeKind::TechnicalFailure);
        let TaskOutcome::TechnicalFailure {
            worker_id,
            error_message,
            retries,
            ..
        } = outcome
        else {
            unreachable!()
        };
        assert_eq!(worker_id, "fallback-worker");
        assert_eq!(error_message, "boom");
        assert_eq!(retries, 0);
    }

    #[tokio::test]
    async fn missing_package_is_an_error() {
        let launcher = Arc::new(ScriptedLauncher::new(0, "{}"));
        let r = runner(
            Path::new("/nonexistent/robot.zip"),
            OutcomePolicy::Fail,
            Arc::default(),
            Arc::clone(&launcher),
            1,
        );
        let result = r.execute(&task(VariableSet::new())).await;
        assert!(matches!(result, Err(SandrunError::Sandbox(_))));
        // never launched, and the permit came back
        assert!(launcher.commands.lock().unwrap().is_empty());
        assert_eq!(r.deps.governor.active(), 0);
    }

    #[tokio::test]
    async fn concurrent_runs_respect_the_limit() {
        let pkg = package_dir();
        let launcher =
            Arc::new(ScriptedLauncher::new(0, "{}").with_delay(Duration::from_millis(200)));
        let r = Arc::new(runner(
            pkg.path(),
            OutcomePolicy::Fail,
            Arc::default(),
            Arc::clone(&launcher),
            2,
        ));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let r = Arc::clone(&r);
                tokio::spawn(async move { r.execute(&task(VariableSet::new())).await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().kind(), OutcomeKind::Complete);
        }

        assert_eq!(launcher.peak.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(launcher.commands.lock().unwrap().len(), 3);
    }
}
