//! App - ワーカーの組み立てと実行
//!
//! # 含まれるコンポーネント
//! - **TaskRunner**: 1 topic 分のパイプライン (sandbox から outcome まで)
//! - **TopicRegistry**: topic 名 → TaskRunner
//! - **WorkerBuilder**: settings と package manifest から Worker を作る
//!
//! # 学習ポイント
//! - 共有する依存 (engine, launcher, governor) は `Arc<RunnerDeps>` 1 つにまとめる
//! - build 時に期待 topic を検証する (fail-fast)

pub mod builder;
pub mod registry;
pub mod runner;

pub use builder::{BuildError, Worker, WorkerBuilder};
pub use registry::{RegistryError, TopicRegistry};
pub use runner::{PROCESS_SCOPE_MARKER, RunnerDeps, TASK_SCOPE_MARKER, TaskRunner};
