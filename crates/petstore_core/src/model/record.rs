//! Column/value records exchanged with store callers.
//!
//! # Responsibility
//! - Carry one row (or a partial row for updates) as ordered `column -> value`
//!   pairs.
//! - Bind scalar values into SQLite statements.
//!
//! # Invariants
//! - A column name appears at most once per record.
//! - Field order follows insertion order, which for query results is the
//!   projection order.

use rusqlite::types::{ToSql, ToSqlOutput, Value};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// Scalar value stored in a pet column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::Integer(_) => None,
        }
    }

    /// Short type label used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(value.as_str().into()),
        })
    }
}

/// One row, or a partial row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets `column`, replacing an existing value in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(FieldValue::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FieldValue::as_str)
    }

    pub fn remove(&mut self, column: &str) -> Option<FieldValue> {
        let index = self.fields.iter().position(|(name, _)| name == column)?;
        Some(self.fields.remove(index).1)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.set(column, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, Record};

    #[test]
    fn set_replaces_in_place_and_keeps_order() {
        let mut record = Record::new().with("name", "Toto").with("weight", 7);
        record.set("name", "Rex");

        assert_eq!(record.column_names(), vec!["name", "weight"]);
        assert_eq!(record.get_str("name"), Some("Rex"));
        assert_eq!(record.get_i64("weight"), Some(7));
    }

    #[test]
    fn typed_getters_do_not_coerce() {
        let record = Record::new().with("weight", "7");
        assert_eq!(record.get_i64("weight"), None);
        assert_eq!(
            record.get("weight"),
            Some(&FieldValue::Text("7".to_string()))
        );
    }
}
