// ABOUTME: Row value model shared by the loader, diff computer and DML executor
// ABOUTME: Canonicalises cell values to the textual form used for comparison and binding

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A single cell value, tagged with its source-level type.
///
/// Values are immutable once produced by the loader. All comparisons and DML
/// parameter bindings go through [`Value::canonical`], so an integer `42` in a
/// JSON file matches the text `"42"` read back from a string column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// The canonical textual form of this value.
    ///
    /// Null renders as the empty string, booleans as `true`/`false`, integers
    /// as plain decimal, floats as the shortest round-trippable decimal
    /// (integral floats render without a fractional part) and instants as
    /// RFC 3339.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Timestamp(t) => t.to_rfc3339(),
        }
    }

    /// Convert a JSON cell into a tagged value.
    ///
    /// Arrays and nested objects have no column-level equivalent; they render
    /// deterministically through their JSON serialization.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

/// A row as a mapping from column name to tagged value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Canonical form of the named column; absent columns render empty.
    pub fn canonical(&self, column: &str) -> String {
        self.columns
            .get(column)
            .map(Value::canonical)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
