//! Telemetry Tables
//!
//! Parses the fixed-width text tables printed by the BMS console into keyed
//! records. Column boundaries are inferred from the header line of every
//! response, since the layout shifts with the number of active batteries.

mod power;
mod table;

pub use power::{
    coerce_field, parse_integer, parse_power_table, parse_with_unit, COULOMB_FIELD,
    INTEGER_FIELDS, STATUS_FIELD, STATUS_ABSENT,
};
pub use table::{infer_columns, parse_table, slice_cell};

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// A table that could not be parsed, with the raw console output for diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Error parsing table: {message} ({response:?})")]
pub struct TableParseError {
    /// What went wrong
    pub message: String,
    /// Raw payload that failed to parse
    pub response: String,
}

impl TableParseError {
    /// Create a parse error carrying the raw payload
    pub fn new(message: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: response.into(),
        }
    }
}

/// Value of a single table cell
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Cell kept as trimmed text
    Text(String),
    /// Cell coerced to an integer
    Integer(i64),
}

impl CellValue {
    /// Text content, if not coerced
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            CellValue::Integer(_) => None,
        }
    }

    /// Integer content, if coerced
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(v) => Some(*v),
            CellValue::Text(_) => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

/// One table row keyed by header column name, in header order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryRecord {
    fields: Vec<(String, CellValue)>,
}

impl TelemetryRecord {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. An existing field keeps its position and takes the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<CellValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Value of column `name`
    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Mutable value of column `name`
    pub fn get_mut(&mut self, name: &str) -> Option<&mut CellValue> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Columns in header order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no columns
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for TelemetryRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = TelemetryRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for TelemetryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
