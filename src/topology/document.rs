//! Typed Request Documents
//!
//! Requests arrive as ordered documents of typed values. The type distinctions matter:
//! a `counter` must be a 64-bit integer and a `processId` an ObjectId, so a plain
//! JSON tree is not enough to validate against.
//!
//! Conversion to and from Extended JSON:
//! - `{"$oid": "<24 hex>"}` is an ObjectId
//! - `{"$numberLong": "<i64>"}` is a 64-bit integer
//! - `{"$numberInt": "<i32>"}` is a 32-bit integer
//! - `{"$numberDouble": "<f64>"}` is a double
//! - plain integers are 32-bit when they fit, 64-bit otherwise
//!
//! Repeated keys are kept when parsing raw bytes; a `serde_json::Value` has
//! already collapsed them.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number};
use thiserror::Error;

use super::process_id::ProcessId;

/// Error converting Extended JSON into a document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// Input was not valid JSON
    #[error("malformed JSON: {0}")]
    Malformed(String),

    /// Top level was not a JSON object
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// `$oid` wrapper did not hold a valid identifier
    #[error("invalid $oid: {0}")]
    InvalidObjectId(String),

    /// Numeric wrapper did not hold a valid number
    #[error("invalid {wrapper}: {value}")]
    InvalidNumber {
        wrapper: &'static str,
        value: String,
    },

    /// Integer outside the 64-bit signed range
    #[error("integer out of range: {0}")]
    OutOfRange(String),
}

/// A typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    ObjectId(ProcessId),
    Document(Document),
    Array(Vec<Value>),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int",
            Value::Int64(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::ObjectId(_) => "objectId",
            Value::Document(_) => "object",
            Value::Array(_) => "array",
        }
    }

    /// Convert from Extended JSON.
    pub fn from_extended_json(json: &serde_json::Value) -> Result<Self, DocumentError> {
        Self::from_raw(&RawJson::from(json))
    }

    fn from_raw(raw: &RawJson) -> Result<Self, DocumentError> {
        match raw {
            RawJson::Null => Ok(Value::Null),
            RawJson::Bool(b) => Ok(Value::Bool(*b)),
            RawJson::Number(n) => number_to_value(n),
            RawJson::String(s) => Ok(Value::String(s.clone())),
            RawJson::Array(items) => items
                .iter()
                .map(Value::from_raw)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            RawJson::Object(entries) => {
                if let Some(value) = unwrap_extended(entries)? {
                    return Ok(value);
                }
                Document::from_entries(entries).map(Value::Document)
            }
        }
    }

    /// Convert to canonical Extended JSON.
    pub fn to_extended_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int32(i) => serde_json::Value::from(*i),
            Value::Int64(i) => serde_json::json!({ "$numberLong": i.to_string() }),
            Value::Double(d) => Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::json!({ "$numberDouble": d.to_string() })),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::ObjectId(id) => serde_json::json!({ "$oid": id.to_hex() }),
            Value::Document(doc) => doc.to_extended_json(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_extended_json).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<ProcessId> for Value {
    fn from(id: ProcessId) -> Self {
        Value::ObjectId(id)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Document(doc)
    }
}

fn number_to_value(n: &Number) -> Result<Value, DocumentError> {
    if let Some(i) = n.as_i64() {
        return Ok(match i32::try_from(i) {
            Ok(small) => Value::Int32(small),
            Err(_) => Value::Int64(i),
        });
    }
    if n.is_u64() {
        return Err(DocumentError::OutOfRange(n.to_string()));
    }
    n.as_f64()
        .map(Value::Double)
        .ok_or_else(|| DocumentError::OutOfRange(n.to_string()))
}

/// Recognise single-key `$` wrappers.
fn unwrap_extended(entries: &[(String, RawJson)]) -> Result<Option<Value>, DocumentError> {
    let [(key, RawJson::String(text))] = entries else {
        return Ok(None);
    };

    let value = match key.as_str() {
        "$oid" => ProcessId::parse_hex(text)
            .map(Value::ObjectId)
            .map_err(|e| DocumentError::InvalidObjectId(e.to_string()))?,
        "$numberLong" => text
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|_| invalid_number("$numberLong", text))?,
        "$numberInt" => text
            .parse::<i32>()
            .map(Value::Int32)
            .map_err(|_| invalid_number("$numberInt", text))?,
        "$numberDouble" => text
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| invalid_number("$numberDouble", text))?,
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn invalid_number(wrapper: &'static str, value: &str) -> DocumentError {
    DocumentError::InvalidNumber {
        wrapper,
        value: value.to_string(),
    }
}

/// An ordered document. Field names may repeat; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Append a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((key.into(), value.into()));
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append every field of `other`.
    pub fn extend(&mut self, other: Document) {
        self.fields.extend(other.fields);
    }

    /// Convert a top-level Extended JSON object.
    pub fn from_extended_json(json: &serde_json::Value) -> Result<Self, DocumentError> {
        Self::from_raw(&RawJson::from(json))
    }

    /// Parse a top-level Extended JSON object from raw bytes, keeping repeated keys.
    pub fn from_extended_json_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        let raw: RawJson =
            serde_json::from_slice(bytes).map_err(|e| DocumentError::Malformed(e.to_string()))?;
        Self::from_raw(&raw)
    }

    fn from_raw(raw: &RawJson) -> Result<Self, DocumentError> {
        match raw {
            RawJson::Object(entries) => Self::from_entries(entries),
            other => Err(DocumentError::NotAnObject(other.type_name())),
        }
    }

    fn from_entries(entries: &[(String, RawJson)]) -> Result<Self, DocumentError> {
        let mut doc = Document::new();
        for (key, value) in entries {
            doc.insert(key.clone(), Value::from_raw(value)?);
        }
        Ok(doc)
    }

    /// Convert to canonical Extended JSON. Repeated keys keep the last value.
    pub fn to_extended_json(&self) -> serde_json::Value {
        let mut map = Map::new();
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.to_extended_json());
        }
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Parsed JSON whose objects keep every entry in order, repeated keys included.
#[derive(Debug, Clone, PartialEq)]
enum RawJson {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<RawJson>),
    Object(Vec<(String, RawJson)>),
}

impl RawJson {
    fn type_name(&self) -> &'static str {
        match self {
            RawJson::Null => "null",
            RawJson::Bool(_) => "bool",
            RawJson::Number(_) => "number",
            RawJson::String(_) => "string",
            RawJson::Array(_) => "array",
            RawJson::Object(_) => "object",
        }
    }
}

impl From<&serde_json::Value> for RawJson {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => RawJson::Null,
            serde_json::Value::Bool(b) => RawJson::Bool(*b),
            serde_json::Value::Number(n) => RawJson::Number(n.clone()),
            serde_json::Value::String(s) => RawJson::String(s.clone()),
            serde_json::Value::Array(items) => {
                RawJson::Array(items.iter().map(RawJson::from).collect())
            }
            serde_json::Value::Object(map) => RawJson::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), RawJson::from(v)))
                    .collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for RawJson {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RawJsonVisitor)
    }
}

struct RawJsonVisitor;

impl<'de> Visitor<'de> for RawJsonVisitor {
    type Value = RawJson;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<RawJson, E> {
        Ok(RawJson::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<RawJson, E> {
        Ok(RawJson::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<RawJson, D::Error> {
        RawJson::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<RawJson, E> {
        Ok(RawJson::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<RawJson, E> {
        Ok(RawJson::Number(i.into()))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<RawJson, E> {
        Ok(RawJson::Number(u.into()))
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> Result<RawJson, E> {
        Number::from_f64(f)
            .map(RawJson::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<RawJson, E> {
        Ok(RawJson::String(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<RawJson, E> {
        Ok(RawJson::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawJson, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(RawJson::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawJson, A::Error> {
        let mut entries = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, RawJson>()? {
            entries.push((key, value));
        }
        Ok(RawJson::Object(entries))
    }
}
