//! Wire -> native.
//!
//! # 学習ポイント
//! - 判断材料は `type` と `valueInfo.serializationDataFormat` だけ (値の中身で推測しない)
//! - File は engine から取得して working dir 配下に置き、native 側には path だけ渡す
//! - Bytes は取得しない (子プロセスに渡す手段がない)

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::domain::{NativeMapping, NativeValue, TypedVariable, ValueType, VariableSet};
use crate::ports::EngineClient;

use super::{CodecError, JAVA_FORMAT, JSON_FORMAT, datetime, java};

/// Capability to download File variables into a sandbox.
#[derive(Clone, Copy)]
pub struct FileFetch<'a> {
    pub engine: &'a dyn EngineClient,
    pub execution_id: &'a str,
    /// Files land in `<destination>/files/<name>/<filename>`.
    pub destination: &'a Path,
}

/// Decode a whole variable set.
///
/// File and Bytes variables never appear in the result unless `fetch` is
/// given, in which case File variables are downloaded and map to their
/// local path. Bytes are never fetched.
pub async fn decode(
    variables: &VariableSet,
    fetch: Option<FileFetch<'_>>,
) -> Result<NativeMapping, CodecError> {
    let mut out = NativeMapping::new();
    for (name, var) in variables {
        // File/Bytes は value が空なので decode_value に回さない
        if var.value_type.is_binary() {
            if let Some(fetch) = fetch
                && var.value_type == ValueType::File
            {
                let path = fetch_file(fetch, name, var).await?;
                out.insert(name.clone(), NativeValue::Path(path));
            }
            continue;
        }
        out.insert(name.clone(), decode_value(var).map_err(|e| named(e, name))?);
    }
    Ok(out)
}

/// Decode a single non-binary variable.
///
/// # Errors
/// - 未知の `serializationDataFormat` は [`CodecError::UnsupportedSerializationFormat`]
/// - value の形が型と合わない場合は [`CodecError::UnexpectedValue`] (name は空、呼び出し側で補う)
pub fn decode_value(var: &TypedVariable) -> Result<NativeValue, CodecError> {
    if var.is_null() {
        return Ok(NativeValue::Null);
    }
    match var.serialization_format() {
        Some(JSON_FORMAT) => {
            let text = var.value.as_str().ok_or_else(|| unexpected("JSON text"))?;
            let parsed: serde_json::Value = serde_json::from_str(text)?;
            Ok(parsed.into())
        }
        Some(JAVA_FORMAT) => {
            let text = var.value.as_str().ok_or_else(|| unexpected("base64 text"))?;
            let bytes = STANDARD.decode(text.trim())?;
            java::to_native(&bytes)
        }
        Some(other) => Err(CodecError::UnsupportedSerializationFormat(other.to_string())),
        None if var.value_type == ValueType::Date => {
            let text = var.value.as_str().ok_or_else(|| unexpected("date string"))?;
            Ok(NativeValue::DateTime(datetime::from_engine(text)?))
        }
        None => Ok(var.value.clone().into()),
    }
}

/// 名前は後から `named` で埋める
fn unexpected(expected: &'static str) -> CodecError {
    CodecError::UnexpectedValue {
        name: String::new(),
        expected,
    }
}

// UnexpectedValue is raised without a name; fill it in at the set level
fn named(err: CodecError, name: &str) -> CodecError {
    match err {
        CodecError::UnexpectedValue { name: n, expected } if n.is_empty() => {
            CodecError::UnexpectedValue {
                name: name.to_string(),
                expected,
            }
        }
        other => other,
    }
}

/// Single path component for `name`: separators become `_`, and `.`/`..`
/// cannot be used to climb out of the files directory.
fn dir_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".repeat(cleaned.len().max(1)),
        _ => cleaned,
    }
}

/// File variable の中身を engine から取り、`<destination>/files/<name>/<filename>` に置く
async fn fetch_file(
    fetch: FileFetch<'_>,
    name: &str,
    var: &TypedVariable,
) -> Result<PathBuf, CodecError> {
    let data = fetch
        .engine
        .fetch_variable_data(fetch.execution_id, name)
        .await
        .map_err(|source| CodecError::Fetch {
            name: name.to_string(),
            source,
        })?;

    // filename comes from the engine; keep only its last component
    let component = dir_component(name);
    let filename = var
        .filename()
        .and_then(|f| Path::new(f).file_name())
        .map(|f| f.to_os_string())
        .unwrap_or_else(|| component.clone().into());

    let dir = fetch.destination.join("files").join(&component);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, &data).await?;
    tracing::debug!(variable = name, path = %path.display(), bytes = data.len(), "fetched file variable");
    Ok(path)
}
