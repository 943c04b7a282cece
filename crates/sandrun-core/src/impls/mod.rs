//! Impls - ports のデフォルト実装
//!
//! # 含まれる実装
//! - **SubprocessLauncher**: tokio::process で子プロセスを実行
//! - **HttpEngineClient**: engine REST API (reqwest)
//! - **FileSecretsProvider**: JSON ファイルから secrets を読む

pub mod engine_http;
pub mod file_secrets;
pub mod subprocess;

pub use self::engine_http::HttpEngineClient;
pub use self::file_secrets::FileSecretsProvider;
pub use self::subprocess::SubprocessLauncher;
