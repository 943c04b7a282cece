//! Native -> wire.
//!
//! Checked in order, first match wins:
//!
//! 1. Null
//! 2. Map / List -> Json
//! 3. Bool (before any numeric check)
//! 4. Float -> Double
//! 5. Int -> Integer inside the i32 range, Long outside
//! 6. DateTime -> Date
//! 7. String -> Date if it parses as ISO 8601, File if it names a file inside
//!    a sandbox root, String otherwise
//! 8. anything else is stringified
//!
//! # 学習ポイント
//! - Bool を数値より先に判定する (wire 上で 1/0 にならないように)
//! - File 判定は sandbox root 配下に限る (任意の path を engine に送らない)

use std::path::{Path, PathBuf};

use crate::domain::{NativeMapping, NativeValue, TypedVariable, VariableSet};

use super::{CodecError, datetime};

const FALLBACK_MIMETYPE: &str = "text/plain";

/// Encode one native value as a wire variable.
///
/// # Arguments
/// * `value` - 子プロセスの mailbox から読んだ値
/// * `roots` - File として送ってよい directory (package dir と working dir)
///
/// # Errors
/// File と判定した path が読めない、または Map/List の JSON 化に失敗した場合。
///
/// # 使用例
/// ```ignore
/// let v = encode(&NativeValue::Int(1 << 40), &[])?;
/// assert_eq!(v.value_type, ValueType::Long);
/// ```
pub fn encode(value: &NativeValue, roots: &[&Path]) -> Result<TypedVariable, CodecError> {
    Ok(match value {
        NativeValue::Null => TypedVariable::null(),
        NativeValue::Map(_) | NativeValue::List(_) => {
            TypedVariable::json(serde_json::to_string(value)?)
        }
        NativeValue::Bool(b) => TypedVariable::boolean(*b),
        NativeValue::Float(f) => TypedVariable::double(*f),
        // Integer に収まらなければ Long
        NativeValue::Int(i) => match i32::try_from(*i) {
            Ok(small) => TypedVariable::integer(small),
            Err(_) => TypedVariable::long(*i),
        },
        NativeValue::DateTime(dt) => TypedVariable::date(datetime::to_engine(dt)),
        NativeValue::String(s) => encode_string(s, roots)?,
        NativeValue::Path(_) => TypedVariable::string(value.to_display_string()),
    })
}

/// Encode every entry; the first failure aborts the whole mapping.
pub fn encode_all(values: &NativeMapping, roots: &[&Path]) -> Result<VariableSet, CodecError> {
    values
        .iter()
        .map(|(name, value)| Ok((name.clone(), encode(value, roots)?)))
        .collect()
}

fn encode_string(s: &str, roots: &[&Path]) -> Result<TypedVariable, CodecError> {
    // date → file → string の順
    if let Some(dt) = datetime::parse_iso(s) {
        return Ok(TypedVariable::date(datetime::to_engine(&dt)));
    }
    if let Some(path) = sandboxed_file(s, roots) {
        let bytes = std::fs::read(&path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mimetype = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or(FALLBACK_MIMETYPE);
        return Ok(TypedVariable::file(&bytes, filename, mimetype));
    }
    Ok(TypedVariable::string(s))
}

/// Resolve `value` to a regular file that lies under one of `roots`.
///
/// Containment is checked on canonical paths, component by component, so
/// `..` segments and symlinks cannot escape a root.
fn sandboxed_file(value: &str, roots: &[&Path]) -> Option<PathBuf> {
    if value.is_empty() {
        return None;
    }
    let given = Path::new(value);
    for root in roots {
        let Ok(root) = root.canonicalize() else {
            continue;
        };
        let candidate = if given.is_absolute() {
            given.to_path_buf()
        } else {
            root.join(given)
        };
        if let Ok(resolved) = candidate.canonicalize()
            && resolved.is_file()
            && resolved.starts_with(&root)
        {
            return Some(resolved);
        }
    }
    None
}
