//! Wire-level variables exchanged with the orchestration engine.
//!
//! # 使用例
//! ```ignore
//! let v = TypedVariable::file(b"%PDF", "invoice.pdf", "application/pdf");
//! assert_eq!(v.value_type, ValueType::File);
//! assert_eq!(v.filename(), Some("invoice.pdf"));
//! ```

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Closed set of engine variable types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Null,
    Boolean,
    Integer,
    Long,
    Double,
    String,
    Date,
    Json,
    File,
    Bytes,
    Object,
}

impl ValueType {
    /// Types whose payload lives behind the engine's data endpoint.
    pub fn is_binary(self) -> bool {
        matches!(self, ValueType::File | ValueType::Bytes)
    }
}

/// Optional metadata attached to a variable (`valueInfo` on the wire).
///
/// The mimetype goes out under both `mimetype` and `mimeType`; either
/// spelling is accepted on the way in, `mimeType` winning when both differ.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ValueInfoWire", into = "ValueInfoWire")]
pub struct ValueInfo {
    pub filename: Option<String>,
    pub mimetype: Option<String>,
    pub encoding: Option<String>,
    pub object_type_name: Option<String>,
    pub serialization_format: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueInfoWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,

    #[serde(default, rename = "mimetype", skip_serializing_if = "Option::is_none")]
    mimetype_lower: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    object_type_name: Option<String>,

    #[serde(
        default,
        rename = "serializationDataFormat",
        skip_serializing_if = "Option::is_none"
    )]
    serialization_format: Option<String>,
}

impl From<ValueInfoWire> for ValueInfo {
    fn from(w: ValueInfoWire) -> Self {
        Self {
            filename: w.filename,
            mimetype: w.mime_type.or(w.mimetype_lower),
            encoding: w.encoding,
            object_type_name: w.object_type_name,
            serialization_format: w.serialization_format,
        }
    }
}

impl From<ValueInfo> for ValueInfoWire {
    fn from(v: ValueInfo) -> Self {
        Self {
            filename: v.filename,
            mimetype_lower: v.mimetype.clone(),
            mime_type: v.mimetype,
            encoding: v.encoding,
            object_type_name: v.object_type_name,
            serialization_format: v.serialization_format,
        }
    }
}

/// A tagged wire value: `{ "value": ..., "type": ..., "valueInfo": {...} }`.
///
/// Constructors keep `type` and the shape of `value` in step; a File always
/// carries a filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedVariable {
    #[serde(default)]
    pub value: serde_json::Value,

    #[serde(rename = "type")]
    pub value_type: ValueType,

    #[serde(default, rename = "valueInfo", skip_serializing_if = "Option::is_none")]
    pub value_info: Option<ValueInfo>,
}

/// name -> variable. Ordering carries no meaning; a sorted map keeps output stable.
pub type VariableSet = BTreeMap<String, TypedVariable>;

impl TypedVariable {
    fn plain(value: serde_json::Value, value_type: ValueType) -> Self {
        Self {
            value,
            value_type,
            value_info: None,
        }
    }

    pub fn null() -> Self {
        Self::plain(serde_json::Value::Null, ValueType::Null)
    }

    pub fn boolean(value: bool) -> Self {
        Self::plain(value.into(), ValueType::Boolean)
    }

    pub fn integer(value: i32) -> Self {
        Self::plain(value.into(), ValueType::Integer)
    }

    pub fn long(value: i64) -> Self {
        Self::plain(value.into(), ValueType::Long)
    }

    /// Non-finite floats have no JSON form and go out as `null`.
    pub fn double(value: f64) -> Self {
        let value = serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
        Self::plain(value, ValueType::Double)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::plain(serde_json::Value::String(value.into()), ValueType::String)
    }

    /// `value` must already be in the engine date format.
    pub fn date(value: impl Into<String>) -> Self {
        Self::plain(serde_json::Value::String(value.into()), ValueType::Date)
    }

    /// `text` is the serialized JSON document.
    pub fn json(text: impl Into<String>) -> Self {
        Self::plain(serde_json::Value::String(text.into()), ValueType::Json)
    }

    /// Base64 payload plus filename, mimetype and a `utf-8` encoding hint.
    pub fn file(bytes: &[u8], filename: impl Into<String>, mimetype: impl Into<String>) -> Self {
        Self {
            value: serde_json::Value::String(STANDARD.encode(bytes)),
            value_type: ValueType::File,
            value_info: Some(ValueInfo {
                filename: Some(filename.into()),
                mimetype: Some(mimetype.into()),
                encoding: Some("utf-8".to_string()),
                ..ValueInfo::default()
            }),
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn filename(&self) -> Option<&str> {
        self.value_info.as_ref()?.filename.as_deref()
    }

    /// `valueInfo.serializationDataFormat`, for Object variables.
    pub fn serialization_format(&self) -> Option<&str> {
        self.value_info.as_ref()?.serialization_format.as_deref()
    }

    /// Decoded payload of a File variable.
    pub fn file_bytes(&self) -> Option<Vec<u8>> {
        if self.value_type != ValueType::File {
            return None;
        }
        STANDARD.decode(self.value.as_str()?).ok()
    }
}
