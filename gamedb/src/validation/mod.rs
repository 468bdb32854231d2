use crate::error::{GameDbError, Result, ValidationError};
use crate::row::{CellValue, Cells};
use crate::schema::{Column, DataType};

/// Existence check for reference columns, answered by the storage layer.
pub trait ReferenceCheck {
    fn row_exists(&self, table_id: i64, row_id: i64) -> Result<bool>;
}

/// Coerce a raw value for a column, including the required-column rule.
pub fn coerce_value(
    column: &Column,
    raw: &serde_json::Value,
    refs: &dyn ReferenceCheck,
) -> Result<CellValue> {
    let value = coerce_type(column, raw, refs)?;
    if value.is_null() && column.required {
        return Err(ValidationError::MissingRequiredValue {
            column: column.name.clone(),
        }
        .into());
    }
    Ok(value)
}

/// Coerce a column's declared default. A default that does not coerce is a
/// schema problem, not a problem with the row being written.
pub fn coerce_default(column: &Column, refs: &dyn ReferenceCheck) -> Result<CellValue> {
    match &column.default_value {
        None => Ok(CellValue::Null),
        Some(raw) => coerce_type(column, raw, refs).map_err(|e| match e {
            GameDbError::Validation(v) => GameDbError::InvalidSchema(format!(
                "Default for column '{}' is invalid: {v}",
                column.name
            )),
            other => other,
        }),
    }
}

/// Resolve the full cell map for a new row: explicit value, else default,
/// else null. Keys naming no column are ignored.
pub fn resolve_new_row(
    columns: &[Column],
    input: &serde_json::Map<String, serde_json::Value>,
    refs: &dyn ReferenceCheck,
) -> Result<Cells> {
    let mut cells = Cells::new();

    for column in columns {
        let explicit = input.get(&column.name).filter(|v| !v.is_null());
        let value = match explicit {
            Some(raw) => coerce_type(column, raw, refs)?,
            None => coerce_default(column, refs)?,
        };

        if value.is_null() && column.required {
            return Err(ValidationError::MissingRequiredValue {
                column: column.name.clone(),
            }
            .into());
        }
        cells.insert(column.name.clone(), value);
    }

    Ok(cells)
}

/// Coerce a partial update. Every key must name a column; the first failure
/// rejects the whole update.
pub fn coerce_partial(
    columns: &[Column],
    input: &serde_json::Map<String, serde_json::Value>,
    refs: &dyn ReferenceCheck,
) -> Result<Cells> {
    let mut cells = Cells::new();

    for (name, raw) in input {
        let column = columns
            .iter()
            .find(|c| &c.name == name)
            .ok_or_else(|| ValidationError::UnknownColumn {
                column: name.clone(),
            })?;
        cells.insert(name.clone(), coerce_value(column, raw, refs)?);
    }

    Ok(cells)
}

fn coerce_type(
    column: &Column,
    raw: &serde_json::Value,
    refs: &dyn ReferenceCheck,
) -> Result<CellValue> {
    if raw.is_null() {
        return Ok(CellValue::Null);
    }

    // Empty text is a value only for string columns
    if column.data_type != DataType::String {
        if let Some(s) = raw.as_str() {
            if s.trim().is_empty() {
                return Ok(CellValue::Null);
            }
        }
    }

    let value = match column.data_type {
        DataType::String => match raw {
            serde_json::Value::String(s) => CellValue::String(s.clone()),
            other => return Err(invalid(column, "string", other)),
        },
        DataType::Integer => CellValue::Integer(
            parse_integer(raw).ok_or_else(|| invalid(column, "integer", raw))?,
        ),
        DataType::Float => {
            CellValue::Float(parse_float(raw).ok_or_else(|| invalid(column, "float", raw))?)
        }
        DataType::Boolean => {
            CellValue::Boolean(parse_boolean(raw).ok_or_else(|| invalid(column, "boolean", raw))?)
        }
        DataType::Enum => {
            let allowed = column.enum_values.clone().unwrap_or_default();
            match raw.as_str() {
                Some(s) if allowed.iter().any(|v| v == s) => CellValue::EnumValue(s.to_string()),
                _ => {
                    return Err(ValidationError::InvalidEnumValue {
                        column: column.name.clone(),
                        value: display_raw(raw),
                        allowed,
                    }
                    .into())
                }
            }
        }
        DataType::Reference => {
            let row_id =
                parse_integer(raw).ok_or_else(|| invalid(column, "row id", raw))?;
            let table_id = column.reference_table_id.ok_or_else(|| {
                GameDbError::InvalidSchema(format!(
                    "Reference column '{}' has no target table",
                    column.name
                ))
            })?;
            if !refs.row_exists(table_id, row_id)? {
                return Err(ValidationError::DanglingReference {
                    column: column.name.clone(),
                    table_id,
                    row_id,
                }
                .into());
            }
            CellValue::ReferenceId(row_id)
        }
    };

    Ok(value)
}

fn parse_integer(raw: &serde_json::Value) -> Option<i64> {
    match raw {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_float(raw: &serde_json::Value) -> Option<f64> {
    let f = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    f.is_finite().then_some(f)
}

fn parse_boolean(raw: &serde_json::Value) -> Option<bool> {
    match raw {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn invalid(column: &Column, expected: &'static str, raw: &serde_json::Value) -> GameDbError {
    ValidationError::InvalidValue {
        column: column.name.clone(),
        expected,
        value: display_raw(raw),
    }
    .into()
}

fn display_raw(raw: &serde_json::Value) -> String {
    match raw {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
