//! Inspection results: the metadata record describing one object of the
//! upstream runtime, with summaries of its methods and attributes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Placeholder doc string sent for callables without documentation.
pub const UNDOCUMENTED: &str = "No documentation available";

/// Placeholder signature sent when a callable cannot be introspected.
pub const SIGNATURE_UNAVAILABLE: &str = "Signature unavailable";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Module,
    Class,
    Number,
    String,
    Scalar,
    Sequence,
    Dictionary,
    Method,
    Error,
    #[default]
    #[serde(other)]
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Number => "number",
            Self::String => "string",
            Self::Scalar => "scalar",
            Self::Sequence => "sequence",
            Self::Dictionary => "dictionary",
            Self::Method => "method",
            Self::Error => "error",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An introspection failure reported in place of a node or member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub error_type: String,
    pub error: String,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.error)
    }
}

/// Result of inspecting one expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InspectionNode {
    // Tried first: only error records carry `error_type` + `error`.
    Error(ErrorInfo),
    Object(ObjectInfo),
}

impl InspectionNode {
    /// Extract the node from an `inspect_result` message.
    ///
    /// The reference runtime nests the node under `data`; a node sent inline
    /// next to the `type` tag is accepted as well.
    pub fn from_message(message: &Value) -> Result<Self, ProtocolError> {
        let body = match message.get("data") {
            Some(data) if data.is_object() => data.clone(),
            _ => message.clone(),
        };
        serde_json::from_value(body).map_err(|e| ProtocolError::Malformed {
            kind: "inspect_result".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Error(_) => Category::Error,
            Self::Object(obj) => obj.category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_builtin: bool,
    /// Descriptive key/value pairs; values are scalars, lists, or null.
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub methods: BTreeMap<String, MethodEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: BTreeMap<String, AttributeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MethodEntry {
    Error(ErrorInfo),
    Method(MethodInfo),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub decorators: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_async: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_generator: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_property: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_runnable: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_builtin: bool,
    /// `instance`, `static`, `class`, `function`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callable_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl MethodInfo {
    /// Signature text, unless the runtime could not produce one.
    pub fn usable_signature(&self) -> Option<&str> {
        self.signature
            .as_deref()
            .filter(|s| *s != SIGNATURE_UNAVAILABLE)
    }

    /// Doc text, unless it is the runtime's placeholder.
    pub fn usable_doc(&self) -> Option<&str> {
        self.doc
            .as_deref()
            .filter(|d| !d.is_empty() && *d != UNDOCUMENTED)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeEntry {
    Error(ErrorInfo),
    Attribute(AttributeInfo),
}

/// Summary of a non-callable member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_builtin: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, Value>,
}
