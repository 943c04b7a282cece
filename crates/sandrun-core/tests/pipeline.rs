//! End-to-end runs through WorkerBuilder with a scripted child and a
//! recording engine.
//!
//! 子プロセスは起動しない。`ScriptedChild` が working dir の中で
//! 子の代わりに mailbox や report を書く。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sandrun_core::app::{Worker, WorkerBuilder};
use sandrun_core::config::WorkerSettings;
use sandrun_core::domain::{
    ExecutionResult, OutcomeKind, SandrunError, TaskContext, TaskOutcome, TypedVariable,
    ValueType, VariableSet,
};
use sandrun_core::launch::{CommandSpec, PROCESS_SCOPE_ENV, TASK_SCOPE_ENV};
use sandrun_core::ports::{EngineClient, EngineError, ProcessLauncher};
use sandrun_core::resolve::{LOG_HTML, OUTPUT_XML};

const PYPROJECT: &str = r#"
[project]
name = "robots"

[tool.sandrun.topics."Send Invoice"]
name = "Send invoice"

[tool.sandrun.topics."Archive"]
name = "Archive"
on-fail = "ERROR"
"#;

#[derive(Default)]
struct RecordingEngine {
    patches: Mutex<Vec<(String, VariableSet)>>,
}

#[async_trait]
impl EngineClient for RecordingEngine {
    async fn fetch_variable_data(&self, _: &str, name: &str) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::Other(format!("unexpected fetch of {name}")))
    }

    async fn patch_local_variables(
        &self,
        execution_id: &str,
        modifications: &VariableSet,
    ) -> Result<(), EngineError> {
        self.patches
            .lock()
            .unwrap()
            .push((execution_id.to_string(), modifications.clone()));
        Ok(())
    }
}

type Script = dyn Fn(&CommandSpec) -> std::io::Result<i32> + Send + Sync;

/// Stands in for the child: runs `script` against the prepared command.
///
/// `peak` is the largest number of this worker's sandboxes seen on disk at
/// once, sampled when a child starts and again when it exits.
struct ScriptedChild {
    script: Box<Script>,
    delay: Duration,
    peak: AtomicUsize,
    commands: Mutex<Vec<CommandSpec>>,
}

impl ScriptedChild {
    fn new(script: impl Fn(&CommandSpec) -> std::io::Result<i32> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            peak: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Working dirs handed out so far that still exist.
    fn sample_live_sandboxes(&self) {
        let live = self
            .commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.cwd.exists())
            .count();
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn working_dirs(&self) -> Vec<PathBuf> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.cwd.clone())
            .collect()
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedChild {
    async fn launch(&self, command: &CommandSpec) -> Result<ExecutionResult, SandrunError> {
        self.commands.lock().unwrap().push(command.clone());
        self.sample_live_sandboxes();

        let exit_code = (self.script)(command)?;
        tokio::time::sleep(self.delay).await;

        self.sample_live_sandboxes();
        Ok(ExecutionResult::new(Some(exit_code), b"stdout text\n", b""))
    }
}

fn write_mailbox(command: &CommandSpec, env: &str, body: &str) -> std::io::Result<()> {
    std::fs::write(&command.env[env], body)
}

fn package() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("pyproject.toml"), PYPROJECT).unwrap();
    std::fs::write(dir.path().join("tasks.robot"), "*** Tasks ***\n").unwrap();
    dir
}

fn worker(
    package: &Path,
    max_jobs: usize,
    engine: Arc<RecordingEngine>,
    child: Arc<ScriptedChild>,
) -> Worker {
    let settings = WorkerSettings {
        max_jobs,
        worker_id: "it-worker".into(),
        ..WorkerSettings::default()
    };
    WorkerBuilder::new(settings)
        .engine(engine)
        .launcher(child)
        .package(package)
        .expect_topics(&["Send Invoice", "Archive"])
        .build()
        .unwrap()
}

fn task(topic: &str, variables: VariableSet) -> TaskContext {
    TaskContext {
        id: "t-1".into(),
        execution_id: "exec-1".into(),
        topic_name: Some(topic.into()),
        variables,
        ..TaskContext::default()
    }
}

#[tokio::test]
async fn completed_run_reports_both_scopes() {
    let pkg = package();
    let child = Arc::new(ScriptedChild::new(|cmd| {
        let report = cmd.cwd.join("report.txt");
        std::fs::write(&report, "all good")?;
        write_mailbox(
            cmd,
            TASK_SCOPE_ENV,
            &serde_json::json!({
                "report": report.display().to_string(),
                "customer": null,
                "total": 12.5,
            })
            .to_string(),
        )?;
        write_mailbox(cmd, PROCESS_SCOPE_ENV, r#"{"approved": true}"#)?;
        Ok(0)
    }));
    let w = worker(pkg.path(), 1, Arc::default(), Arc::clone(&child));

    // customer は String で入ってきて null で返る
    let mut inbound = VariableSet::new();
    inbound.insert("customer".into(), TypedVariable::string("ACME"));
    let outcome = w.execute(&task("Send Invoice", inbound)).await.unwrap();

    let TaskOutcome::Complete {
        worker_id,
        local_variables,
        process_variables,
    } = outcome
    else {
        panic!("expected Complete");
    };
    assert_eq!(worker_id, "it-worker");

    let report = &local_variables["report"];
    assert_eq!(report.value_type, ValueType::File);
    assert_eq!(report.filename(), Some("report.txt"));
    assert_eq!(report.file_bytes().unwrap(), b"all good");

    // null keeps the inbound type
    assert!(local_variables["customer"].is_null());
    assert_eq!(local_variables["customer"].value_type, ValueType::String);
    assert_eq!(local_variables["total"].value_type, ValueType::Double);

    assert_eq!(process_variables["approved"].value_type, ValueType::Boolean);

    // sandbox は outcome を返す前に消えている
    for dir in child.working_dirs() {
        assert!(!dir.exists(), "{} should have been removed", dir.display());
    }
}

fn failing_child(reason: &'static str) -> ScriptedChild {
    ScriptedChild::new(move |cmd| {
        std::fs::write(
            cmd.cwd.join(OUTPUT_XML),
            format!(r#"<robot><status status="FAIL" elapsed="0.1">{reason}</status></robot>"#),
        )?;
        std::fs::write(cmd.cwd.join(LOG_HTML), "<html><body>log</body></html>")?;
        Ok(1)
    })
}

#[tokio::test]
async fn failed_run_with_fail_policy_is_a_technical_failure() {
    let pkg = package();
    let engine = Arc::new(RecordingEngine::default());
    let child = Arc::new(failing_child("Invoice missing"));
    let w = worker(pkg.path(), 1, Arc::clone(&engine), child);

    let outcome = w
        .execute(&task("Send Invoice", VariableSet::new()))
        .await
        .unwrap();
    let TaskOutcome::TechnicalFailure {
        error_message,
        error_details,
        retries,
        retry_timeout,
        ..
    } = outcome
    else {
        panic!("expected TechnicalFailure");
    };
    assert_eq!(error_message, "Invoice missing");
    assert_eq!(error_details, "stdout text");
    assert_eq!((retries, retry_timeout), (0, 0));

    // report files are pushed onto the execution before the failure is returned
    let patches = engine.patches.lock().unwrap();
    assert_eq!(patches.len(), 1);
    let (execution_id, vars) = &patches[0];
    assert_eq!(execution_id, "exec-1");
    assert_eq!(vars[LOG_HTML].value_type, ValueType::File);
    assert_eq!(vars[OUTPUT_XML].value_type, ValueType::File);
}

#[tokio::test]
async fn failed_run_with_error_policy_is_a_business_fault() {
    let pkg = package();
    let engine = Arc::new(RecordingEngine::default());
    let child = Arc::new(failing_child("ARCHIVE_FULL\nNo space left in archive"));
    let w = worker(pkg.path(), 1, Arc::clone(&engine), child);

    let outcome = w.execute(&task("Archive", VariableSet::new())).await.unwrap();
    let TaskOutcome::BusinessFault {
        error_code,
        error_message,
        ..
    } = outcome
    else {
        panic!("expected BusinessFault");
    };
    assert_eq!(error_code, "ARCHIVE_FULL");
    assert_eq!(error_message, "No space left in archive");
    assert_eq!(engine.patches.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn n_plus_one_runs_never_exceed_max_jobs() {
    let pkg = package();
    let mut child = ScriptedChild::new(|cmd| {
        write_mailbox(cmd, TASK_SCOPE_ENV, "{}")?;
        Ok(0)
    });
    child.delay = Duration::from_millis(200);
    let child = Arc::new(child);
    let w = Arc::new(worker(pkg.path(), 3, Arc::default(), Arc::clone(&child)));

    // max_jobs + 1 runs at once
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let w = Arc::clone(&w);
            tokio::spawn(async move {
                let mut t = task("Send Invoice", VariableSet::new());
                t.id = format!("t-{i}");
                w.execute(&t).await
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.await.unwrap().unwrap().kind(), OutcomeKind::Complete);
    }

    // three sandboxes alive together, never a fourth
    assert_eq!(child.peak.load(Ordering::SeqCst), 3);
    assert_eq!(w.governor().active(), 0);
    let dirs = child.working_dirs();
    assert_eq!(dirs.len(), 4);
    assert!(dirs.iter().all(|d| !d.exists()));
}

#[tokio::test]
async fn zipped_package_with_cache_runs_offline() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("robots.zip");
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("pyproject.toml", options).unwrap();
    zip.write_all(PYPROJECT.as_bytes()).unwrap();
    zip.start_file(".cache/wheels/pkg.whl", options).unwrap();
    zip.write_all(b"wheel").unwrap();
    zip.finish().unwrap();

    // .cache is moved out of the package into the working dir
    let child = Arc::new(ScriptedChild::new(|cmd| {
        assert!(cmd.cwd.join(".cache/wheels/pkg.whl").is_file());
        Ok(0)
    }));
    let w = worker(&archive, 1, Arc::default(), Arc::clone(&child));

    let outcome = w.execute(&task("Archive", VariableSet::new())).await.unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Complete);

    let commands = child.commands.lock().unwrap();
    assert!(commands[0].args.iter().any(|a| a == "--offline"));
}
