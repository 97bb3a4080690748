//! Record documents carried by queued edits and remote snapshots.
//!
//! Categories differ in shape, so a record is a free-form JSON object. The
//! only fields the engine interprets are the identifier and the
//! last-modified timestamp.

use crate::{error::Result, Error, RecordId, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the record identifier.
pub const ID_FIELD: &str = "id";

/// Fields consulted, in order, for a record's last-modified time.
pub const MODIFIED_FIELDS: [&str; 3] = ["modifiedAt", "updatedAt", "timestamp"];

/// A single record: a JSON object keyed by field name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Create a document with only an identifier set.
    pub fn with_id(id: impl Into<Value>) -> Self {
        let mut doc = Self::new();
        doc.insert(ID_FIELD, id);
        doc
    }

    /// Convert a JSON value into a document. Only objects are accepted.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(Error::InvalidPayload(format!(
                "record must be an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Canonical identifier of this record.
    ///
    /// String and integer ids are both accepted; `1` and `"1"` name the same
    /// record. Empty strings, floats and other types have no identifier.
    pub fn id(&self) -> Option<RecordId> {
        match self.0.get(ID_FIELD)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
            _ => None,
        }
    }

    /// Last-modified time declared by the record itself, if any.
    pub fn modified_at(&self) -> Option<Timestamp> {
        MODIFIED_FIELDS
            .iter()
            .find_map(|field| self.0.get(*field).and_then(parse_timestamp))
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field value, returning the previous one.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Borrow all fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Overlay `other`'s fields onto this record. Fields present only here
    /// are preserved; same-named fields take `other`'s value.
    pub fn merge_from(&mut self, other: &Document) {
        for (field, value) in &other.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Consume the document, returning the underlying JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for Document {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

/// Parse a timestamp field: RFC 3339 text or integer milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}
