//! sandrun-core
//!
//! Runs one leased workflow task inside a throwaway sandbox and turns the
//! child's results into an outcome for the engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, variable, native, task, outcome, errors）
//! - **codec**: engine の型付き変数 ⇄ native value（JSON / Java serialization / date）
//! - **sandbox**: package と working dir の用意、入力ファイルの書き出し
//! - **launch**: 子プロセスのコマンド組み立て
//! - **resolve**: mailbox と exit code から TaskOutcome を決める
//! - **governor**: 同時実行数の上限
//! - **config**: WorkerSettings と package manifest
//! - **ports**: 抽象化レイヤー（EngineClient, ProcessLauncher, SecretsProvider）
//! - **impls**: ports の実装（reqwest, tokio::process, JSON file）
//! - **app**: TaskRunner, TopicRegistry, WorkerBuilder

pub mod app;
pub mod codec;
pub mod config;
pub mod domain;
pub mod governor;
pub mod impls;
pub mod launch;
pub mod ports;
pub mod resolve;
pub mod sandbox;
