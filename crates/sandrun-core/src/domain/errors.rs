//! Errors - パイプライン全体のエラー型
//!
//! A non-zero child exit is *not* an error: it is routed through
//! `OutcomePolicy`. `SandrunError` covers the cases where no outcome could be
//! produced at all.

use thiserror::Error;

use crate::codec::CodecError;
use crate::ports::{EngineError, SecretsError};
use crate::sandbox::SandboxError;

/// Reasons a run produced no outcome at all.
///
/// 呼び出し側 (lease を持っている側) はこれを受けたら task を engine に
/// 返却するか、lock の期限切れに任せる。
#[derive(Debug, Error)]
pub enum SandrunError {
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("sandbox: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    #[error("secrets: {0}")]
    Secrets(#[from] SecretsError),

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mailbox {path}: {reason}")]
    Mailbox {
        path: std::path::PathBuf,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("concurrency governor is closed")]
    GovernorClosed,

    #[error("no runner registered for topic {0:?}")]
    UnknownTopic(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_keep_their_message() {
        let err: SandrunError = CodecError::UnsupportedSerializationFormat("text/yaml".into()).into();
        let msg = err.to_string();
        assert!(msg.starts_with("codec:"));
        assert!(msg.contains("text/yaml"));
    }
}
