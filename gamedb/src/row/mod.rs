// Typed cells and rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A cell value after coercion against its column.
///
/// Only the validation module produces these from raw input; everything past
/// that boundary works with this closed set of variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    EnumValue(String),
    ReferenceId(i64),
    Null,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Plain JSON form, as accepted again by coercion and used in exports.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::String(s) | CellValue::EnumValue(s) => serde_json::Value::String(s.clone()),
            CellValue::Integer(n) | CellValue::ReferenceId(n) => serde_json::Value::from(*n),
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Boolean(b) => serde_json::Value::Bool(*b),
            CellValue::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) | CellValue::EnumValue(s) => write!(f, "{s}"),
            CellValue::Integer(n) | CellValue::ReferenceId(n) => write!(f, "{n}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Boolean(b) => write!(f, "{b}"),
            CellValue::Null => f.write_str("null"),
        }
    }
}

/// Cell map keyed by column name.
pub type Cells = BTreeMap<String, CellValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: i64,
    pub table_id: i64,
    pub cells: Cells,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row {
    /// Value of a cell; absent cells read as null.
    pub fn get(&self, column: &str) -> &CellValue {
        self.cells.get(column).unwrap_or(&CellValue::Null)
    }

    /// Flat JSON object with the row id and plain cell values. A column
    /// named `id` is listed under the key [`cell_key`] gives it.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert(ROW_ID_KEY.to_string(), serde_json::Value::from(self.id));
        for (name, value) in &self.cells {
            let key = cell_key(name, ROW_ID_KEY, |k| self.cells.contains_key(k));
            obj.insert(key, value.to_json());
        }
        serde_json::Value::Object(obj)
    }
}

/// Key of the row id in the flat JSON form of a row.
pub const ROW_ID_KEY: &str = "id";

/// Key for a column's cells in a flat document that also holds the row id
/// under `id_key`. The colliding column moves to the first `_`-suffixed name
/// that `is_column` does not claim.
pub fn cell_key(column: &str, id_key: &str, is_column: impl Fn(&str) -> bool) -> String {
    if column != id_key {
        return column.to_string();
    }
    let mut key = format!("{column}_");
    while is_column(&key) {
        key.push('_');
    }
    key
}
