//! Ports - 外部システムへの抽象化レイヤー
//!
//! Each trait is a seam to something outside the core: the engine's REST
//! API, the secrets backend, and the OS process table. Default
//! implementations live in `impls`; tests swap in fakes.
//!
//! # 学習ポイント
//! - async な port は `#[async_trait]` で `dyn` 互換にする (`Arc<dyn EngineClient>`)
//! - 各 port は自分のエラー型を持ち、`SandrunError` へは `#[from]` で合流

pub mod engine;
pub mod launcher;
pub mod secrets;

pub use self::engine::{EngineClient, EngineError};
pub use self::launcher::ProcessLauncher;
pub use self::secrets::{SecretsError, SecretsProvider};
