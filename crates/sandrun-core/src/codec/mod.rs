//! Variable codec: engine wire variables ⇄ native values.
//!
//! - **decode** is metadata-driven: the engine is authoritative about its own
//!   types, so `type` and `valueInfo.serializationDataFormat` decide.
//! - **encode** is value-driven: the child only knows native values, so the
//!   wire type is inferred by an ordered predicate chain.
//!
//! # 含まれるモジュール
//! - **decode**: wire → native (File/Bytes は engine から取得して working dir に置く)
//! - **encode**: native → wire (値の形から型を推論)
//! - **datetime**: engine の date 形式 (`yyyy-MM-dd'T'HH:mm:ss.SSSZ`) と ISO 8601
//! - **java**: Java serialization stream の読み取り (書き込みはしない)
//!
//! # 学習ポイント
//! - 失敗は全部 [`CodecError`] に集約し、上位では `SandrunError::Codec` に包む
//! - 型の判断基準が decode と encode で逆向き (metadata 主導 / 値主導)

pub mod datetime;
pub mod decode;
pub mod encode;
pub mod java;

pub use self::decode::{FileFetch, decode, decode_value};
pub use self::encode::{encode, encode_all};

use crate::ports::EngineError;

/// `serializationDataFormat` of JSON-serialized objects.
pub const JSON_FORMAT: &str = "application/json";

/// `serializationDataFormat` of Java-serialized objects (base64 on the wire).
pub const JAVA_FORMAT: &str = "application/x-java-serialized-object";

/// Errors of both codec directions.
///
/// `Fetch` keeps the engine error as its source so the caller can tell a
/// network problem from a malformed payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported serialization format: {0}")]
    UnsupportedSerializationFormat(String),

    #[error("invalid date {value:?}")]
    InvalidDate { value: String },

    #[error("variable {name} should hold a {expected}")]
    UnexpectedValue { name: String, expected: &'static str },

    #[error("java object stream: {0}")]
    JavaStream(String),

    #[error("java type {0} cannot be converted to a native value")]
    UnsupportedJavaType(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to fetch file variable {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: EngineError,
    },
}
