//! Native values: what the sandboxed child reads and writes.
//!
//! The child only ever sees JSON, so this is JSON plus the two shapes the
//! host produces on the way in (timestamps from Date variables, paths of
//! fetched files). The `Serialize` impl is the custom writer used for every
//! JSON file handed to the child.
//!
//! # 学習ポイント
//! - `Serialize` を手書きして DateTime / Path の出力形式を 1 箇所に閉じ込める
//! - `From<serde_json::Value>` で mailbox の JSON をそのまま native に変換

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Local};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Local wall-clock rendering of timestamps inside JSON documents.
pub const JSON_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A value on the child's side of the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// From Date variables; written as local wall-clock text.
    DateTime(DateTime<FixedOffset>),
    /// A fetched File variable inside the working dir.
    Path(PathBuf),
    List(Vec<NativeValue>),
    Map(BTreeMap<String, NativeValue>),
}

/// Top-level variables as the child sees them (`variables.json`).
pub type NativeMapping = BTreeMap<String, NativeValue>;

impl NativeValue {
    /// Text form used when a value has to become a plain string.
    pub fn to_display_string(&self) -> String {
        match self {
            NativeValue::Null => String::new(),
            NativeValue::Bool(b) => b.to_string(),
            NativeValue::Int(i) => i.to_string(),
            NativeValue::Float(f) => f.to_string(),
            NativeValue::String(s) => s.clone(),
            NativeValue::DateTime(dt) => dt.to_rfc3339(),
            NativeValue::Path(p) => absolute(p),
            NativeValue::List(_) | NativeValue::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }
}

fn absolute(path: &std::path::Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

impl Serialize for NativeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NativeValue::Null => serializer.serialize_unit(),
            NativeValue::Bool(b) => serializer.serialize_bool(*b),
            NativeValue::Int(i) => serializer.serialize_i64(*i),
            NativeValue::Float(f) => serializer.serialize_f64(*f),
            NativeValue::String(s) => serializer.serialize_str(s),
            NativeValue::DateTime(dt) => {
                let local = dt.with_timezone(&Local).naive_local();
                serializer.serialize_str(&local.format(JSON_TIMESTAMP_FORMAT).to_string())
            }
            NativeValue::Path(p) => serializer.serialize_str(&absolute(p)),
            NativeValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            NativeValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl From<serde_json::Value> for NativeValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => NativeValue::Null,
            serde_json::Value::Bool(b) => NativeValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => NativeValue::Int(i),
                // u64 above i64::MAX has no engine integer type left
                None => NativeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => NativeValue::String(s),
            serde_json::Value::Array(items) => {
                NativeValue::List(items.into_iter().map(NativeValue::from).collect())
            }
            serde_json::Value::Object(entries) => NativeValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, NativeValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        NativeValue::Bool(value)
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        NativeValue::Int(value)
    }
}

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        NativeValue::Float(value)
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        NativeValue::String(value.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        NativeValue::String(value)
    }
}
