//! Structured result values.
//!
//! Query outcomes are returned to callers as a small tagged tree: none,
//! number, binary-safe string, or an ordered array of key/value pairs whose
//! keys are numbers (positional) or strings (named).

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Number(f64),
    /// Raw bytes with an exact length; not required to be UTF-8.
    String(Vec<u8>),
    /// Ordered key/value pairs.
    Array(Vec<(Value, Value)>),
}

impl Value {
    /// Create an empty array.
    pub fn array() -> Self {
        Self::Array(Vec::new())
    }

    /// Create a string value from anything byte-like.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::String(bytes.into())
    }

    /// Create an array from values keyed 0, 1, 2, ...
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::Number(i as f64), v))
                .collect(),
        )
    }

    /// Append a named entry. No-op on non-array values.
    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: Value) {
        if let Self::Array(entries) = self {
            entries.push((Value::String(key.into()), value));
        }
    }

    /// Append an entry under the next positional index. No-op on non-array values.
    pub fn push(&mut self, value: Value) {
        if let Self::Array(entries) = self {
            let index = entries.len() as f64;
            entries.push((Value::Number(index), value));
        }
    }

    /// Look up a named entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Array(entries) => entries
                .iter()
                .find(|(k, _)| k.as_bytes() == Some(key.as_bytes()))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Look up a positional entry.
    pub fn index(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Array(entries) => entries
                .iter()
                .find(|(k, _)| k.as_number() == Some(index as f64))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Entries of an array value, in insertion order.
    pub fn entries(&self) -> &[(Value, Value)] {
        match self {
            Self::Array(entries) => entries,
            _ => &[],
        }
    }

    /// Number of entries for arrays, byte length for strings, 0 otherwise.
    pub fn len(&self) -> usize {
        match self {
            Self::Array(entries) => entries.len(),
            Self::String(bytes) => bytes.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// String contents if they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
        }
    }

    /// True when every key is the positional index of its entry.
    fn is_list(entries: &[(Value, Value)]) -> bool {
        entries
            .iter()
            .enumerate()
            .all(|(i, (k, _))| k.as_number() == Some(i as f64))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into_bytes())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<Option<Vec<u8>>> for Value {
    fn from(cell: Option<Vec<u8>>) -> Self {
        cell.map(Self::String).unwrap_or(Self::None)
    }
}

/// Render a string key or value: UTF-8 verbatim, anything else as base64.
fn render_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => STANDARD.encode(bytes),
    }
}

fn render_key(key: &Value) -> String {
    match key {
        Value::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
        Value::Number(n) => n.to_string(),
        Value::String(bytes) => render_bytes(bytes),
        other => other.type_name().to_string(),
    }
}

/// JSON rendering: positional arrays become JSON arrays, keyed arrays become
/// objects (entry order preserved), whole numbers are emitted as integers.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_none(),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(bytes) => serializer.serialize_str(&render_bytes(bytes)),
            Value::Array(entries) if Value::is_list(entries) => {
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for (_, v) in entries {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Array(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(&render_key(k), v)?;
                }
                map.end()
            }
        }
    }
}
