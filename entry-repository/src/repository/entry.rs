//! Entry record type
//!
//! An [`Entry`] is one persisted record: an id assigned by the backend, a map
//! of column attributes, the `created_at` / `updated_at` pair and the optional
//! soft-delete marker. Eager-loaded relations ride along in `relations`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier assigned by the storage backend
pub type EntryId = i64;

/// Column name to value mapping
pub type Attributes = Map<String, Value>;

/// Columns managed by the repository rather than by callers
pub const RESERVED_COLUMNS: [&str; 4] = ["id", "created_at", "updated_at", "deleted_at"];

/// A persisted (or not yet persisted) record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entry {
    /// Backend id, `None` until the entry is first saved
    pub id: Option<EntryId>,
    /// Column values
    #[serde(default)]
    pub attributes: Attributes,
    /// When the entry was created
    pub created_at: Option<DateTime<Utc>>,
    /// When the entry was last written
    pub updated_at: Option<DateTime<Utc>>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
    /// Eager-loaded relations by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, Vec<Entry>>,
}

impl Entry {
    /// Create an unsaved entry from attributes
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    /// Whether the entry has been persisted
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    /// Whether the entry carries a soft-delete marker
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Attribute value by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Set an attribute value
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(column.into(), value.into());
    }

    /// Loaded relation by name
    pub fn relation(&self, name: &str) -> Option<&[Entry]> {
        self.relations.get(name).map(Vec::as_slice)
    }

    /// Value of any column, including the managed ones
    ///
    /// Timestamps are rendered as fixed-width RFC 3339 strings so that they
    /// order correctly when compared as text.
    pub fn column(&self, column: &str) -> Option<Value> {
        match column {
            "id" => self.id.map(Value::from),
            "created_at" => self.created_at.map(timestamp_value),
            "updated_at" => self.updated_at.map(timestamp_value),
            "deleted_at" => self.deleted_at.map(timestamp_value),
            other => self.attributes.get(other).cloned(),
        }
    }
}

fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Total order over optional JSON values
///
/// Missing and null values sort first, then booleans, numbers, strings and
/// finally arrays/objects (compared by their serialized form).
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) | Some(Value::Object(_)) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .partial_cmp(&y.as_f64().unwrap_or(f64::NAN))
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x @ (Value::Array(_) | Value::Object(_))), Some(y @ (Value::Array(_) | Value::Object(_)))) => {
            x.to_string().cmp(&y.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
