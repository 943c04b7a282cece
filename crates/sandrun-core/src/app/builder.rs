//! WorkerBuilder - ワーカーの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 設定値・manifest・期待 topic を build 時に確認
//! - ports は差し替え可能、未指定ならデフォルト実装

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ConfigError, PackageManifest, WorkerSettings, resolve_secrets};
use crate::domain::{SandrunError, TaskContext, TaskOutcome};
use crate::governor::{Governor, InvalidLimit};
use crate::impls::{HttpEngineClient, SubprocessLauncher};
use crate::ports::{EngineClient, EngineError, ProcessLauncher, SecretsError};

use super::registry::{RegistryError, TopicRegistry};
use super::runner::{RunnerDeps, TaskRunner};

/// WorkerBuilder は settings と package から Worker を構築
///
/// # 使用例
/// ```ignore
/// let worker = WorkerBuilder::new(settings)
///     .package("robots/")
///     .expect_topics(&["Send Invoice"])
///     .build()?;
/// ```
pub struct WorkerBuilder {
    settings: WorkerSettings,
    packages: Vec<PathBuf>,
    engine: Option<Arc<dyn EngineClient>>,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    expected_topics: Option<Vec<String>>,
}

/// Everything `build` can reject, all detected before any task runs.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("secrets: {0}")]
    Secrets(#[from] SecretsError),

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("engine client: {0}")]
    Engine(#[from] EngineError),

    #[error("governor: {0}")]
    Governor(#[from] InvalidLimit),

    #[error("package path {path}: {source}")]
    PackagePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing topics: {0:?}. These topics were expected but no package declares them.")]
    MissingTopics(Vec<String>),
}

impl WorkerBuilder {
    pub fn new(settings: WorkerSettings) -> Self {
        Self {
            settings,
            packages: Vec::new(),
            engine: None,
            launcher: None,
            expected_topics: None,
        }
    }

    /// Add a package (directory or zip archive). Every topic in its manifest
    /// gets a runner.
    pub fn package(mut self, path: impl Into<PathBuf>) -> Self {
        self.packages.push(path.into());
        self
    }

    /// Replace the HTTP engine client (tests, or a preconfigured client).
    pub fn engine(mut self, engine: Arc<dyn EngineClient>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replace the `tokio::process` launcher.
    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Topics that must be declared by some package, checked in `build`.
    pub fn expect_topics(mut self, topics: &[&str]) -> Self {
        self.expected_topics = Some(topics.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Validate everything and wire the worker.
    ///
    /// # フロー
    /// 1. settings の検証と governor の作成
    /// 2. engine / launcher (未指定ならデフォルト実装)
    /// 3. package ごとに manifest と secrets を読み、topic ごとに runner を登録
    /// 4. 期待 topic がすべて揃っているか確認
    pub fn build(self) -> Result<Worker, BuildError> {
        let settings = self.settings;
        settings.validate()?;

        let governor = Governor::new(settings.max_jobs)?;
        let engine: Arc<dyn EngineClient> = match self.engine {
            Some(engine) => engine,
            None => Arc::new(HttpEngineClient::new(
                &settings.base_url,
                settings.authorization.as_deref(),
            )?),
        };
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(SubprocessLauncher::new()));

        let deps = Arc::new(RunnerDeps {
            governor: governor.clone(),
            engine,
            launcher,
            program: settings.runner.clone(),
            worker_id: settings.worker_id.clone(),
            loader: settings.loader_source()?,
        });

        let mut registry = TopicRegistry::new();
        for package in self.packages {
            let package = std::path::absolute(&package)
                .map_err(|source| BuildError::PackagePath { path: package, source })?;
            let manifest = PackageManifest::load(&package)?;
            let secrets = resolve_secrets(&manifest.secrets, settings.secrets_profile.as_deref())?;

            for (topic, config) in manifest.topics {
                let policy = config.effective_policy(settings.on_fail);
                tracing::info!(
                    %topic,
                    package = %package.display(),
                    %policy,
                    scope = %config.lease_scope(),
                    "topic registered"
                );
                registry.register(TaskRunner::new(
                    topic,
                    package.clone(),
                    config,
                    policy,
                    secrets.clone(),
                    Arc::clone(&deps),
                ))?;
            }
        }

        if let Some(expected) = &self.expected_topics {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| registry.get(t).is_none())
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTopics(missing));
            }
        }

        Ok(Worker { registry, governor })
    }
}

/// Worker はワーカーのランタイム
///
/// Leasing tasks is someone else's job: the caller hands over each locked
/// task and reports the returned outcome.
#[derive(Debug)]
pub struct Worker {
    pub registry: TopicRegistry,
    governor: Governor,
}

impl Worker {
    /// Dispatch on the task's own `topicName`.
    pub async fn execute(&self, task: &TaskContext) -> Result<TaskOutcome, SandrunError> {
        let topic = task.topic_name.as_deref().unwrap_or_default();
        self.registry.execute(topic, task).await
    }

    pub fn topics(&self) -> Vec<String> {
        self.registry.topics()
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    /// Stop admitting runs. Runs already holding a permit finish normally.
    pub fn shutdown(&self) {
        self.governor.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{RecordingEngine, ScriptedLauncher, package_dir};
    use crate::domain::{OutcomeKind, OutcomePolicy};
    use crate::sandbox::DEFAULT_LOADER;

    fn builder(settings: WorkerSettings) -> WorkerBuilder {
        WorkerBuilder::new(settings)
            .engine(Arc::new(RecordingEngine::default()))
            .launcher(Arc::new(ScriptedLauncher::new(0, "{}")))
    }

    fn archive_task() -> TaskContext {
        TaskContext {
            id: "t-1".into(),
            execution_id: "e-1".into(),
            topic_name: Some("Archive".into()),
            ..TaskContext::default()
        }
    }

    #[tokio::test]
    async fn default_build_writes_the_built_in_loader() {
        let pkg = package_dir();
        let launcher = Arc::new(ScriptedLauncher::new(0, "{}"));
        let worker = WorkerBuilder::new(WorkerSettings::default())
            .engine(Arc::new(RecordingEngine::default()))
            .launcher(Arc::clone(&launcher) as Arc<dyn ProcessLauncher>)
            .package(pkg.path())
            .build()
            .unwrap();

        worker.execute(&archive_task()).await.unwrap();

        let loaders = launcher.loaders.lock().unwrap();
        assert_eq!(loaders.len(), 1);
        assert_eq!(loaders[0], DEFAULT_LOADER);
    }

    #[tokio::test]
    async fn configured_loader_replaces_the_built_in_one() {
        let pkg = package_dir();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Custom.py");
        std::fs::write(&path, "# custom loader").unwrap();
        let launcher = Arc::new(ScriptedLauncher::new(0, "{}"));
        let settings = WorkerSettings {
            loader: Some(path),
            ..WorkerSettings::default()
        };
        let worker = WorkerBuilder::new(settings)
            .engine(Arc::new(RecordingEngine::default()))
            .launcher(Arc::clone(&launcher) as Arc<dyn ProcessLauncher>)
            .package(pkg.path())
            .build()
            .unwrap();

        worker.execute(&archive_task()).await.unwrap();

        assert_eq!(launcher.loaders.lock().unwrap()[0], "# custom loader");
    }

    #[test]
    fn build_success() {
        let pkg = package_dir();
        let worker = builder(WorkerSettings::default())
            .package(pkg.path())
            .expect_topics(&["Send Invoice", "Archive"])
            .build()
            .unwrap();
        assert_eq!(worker.topics(), vec!["Archive", "Send Invoice"]);
        assert_eq!(worker.governor().limit(), 1);
    }

    #[test]
    fn policies_come_from_the_manifest_or_the_settings() {
        let pkg = package_dir();
        let settings = WorkerSettings {
            on_fail: OutcomePolicy::Complete,
            ..WorkerSettings::default()
        };
        let worker = builder(settings).package(pkg.path()).build().unwrap();
        let policy = |t: &str| worker.registry.get(t).unwrap().policy();
        assert_eq!(policy("Archive"), OutcomePolicy::Error);
        assert_eq!(policy("Send Invoice"), OutcomePolicy::Complete);
    }

    #[test]
    fn build_missing_topics() {
        let pkg = package_dir();
        let worker = builder(WorkerSettings::default())
            .package(pkg.path())
            .expect_topics(&["Archive", "Ship"])
            .build();
        assert!(matches!(
            worker,
            Err(BuildError::MissingTopics(missing)) if missing == vec!["Ship".to_string()]
        ));
    }

    #[test]
    fn same_topic_in_two_packages_is_rejected() {
        let (a, b) = (package_dir(), package_dir());
        let worker = builder(WorkerSettings::default())
            .package(a.path())
            .package(b.path())
            .build();
        assert!(matches!(
            worker,
            Err(BuildError::Registry(RegistryError::DuplicateTopic(_)))
        ));
    }

    #[test]
    fn invalid_settings_fail_fast() {
        let settings = WorkerSettings {
            max_jobs: 0,
            ..WorkerSettings::default()
        };
        assert!(matches!(builder(settings).build(), Err(BuildError::Config(_))));
    }

    #[test]
    fn missing_manifest_is_reported() {
        let empty = tempfile::tempdir().unwrap();
        let worker = builder(WorkerSettings::default()).package(empty.path()).build();
        assert!(matches!(worker, Err(BuildError::Config(ConfigError::Read { .. }))));
    }

    #[tokio::test]
    async fn execute_dispatches_on_topic_name() {
        let pkg = package_dir();
        let worker = builder(WorkerSettings::default())
            .package(pkg.path())
            .build()
            .unwrap();

        let task = TaskContext {
            id: "t-1".into(),
            execution_id: "e-1".into(),
            topic_name: Some("Archive".into()),
            ..TaskContext::default()
        };
        let outcome = worker.execute(&task).await.unwrap();
        assert_eq!(outcome.kind(), OutcomeKind::Complete);

        let unknown = TaskContext {
            topic_name: None,
            ..task
        };
        assert!(matches!(
            worker.execute(&unknown).await,
            Err(SandrunError::UnknownTopic(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_refuses_new_runs() {
        let pkg = package_dir();
        let worker = builder(WorkerSettings::default())
            .package(pkg.path())
            .build()
            .unwrap();
        worker.shutdown();
        let task = TaskContext {
            topic_name: Some("Archive".into()),
            ..TaskContext::default()
        };
        assert!(matches!(
            worker.execute(&task).await,
            Err(SandrunError::GovernorClosed)
        ));
    }
}
