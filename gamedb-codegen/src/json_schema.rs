use gamedb::row::{cell_key, ROW_ID_KEY};
use gamedb::TableSnapshot;
use serde_json::{json, Map, Value};

use crate::type_utils::json_schema_type;

const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

/// Describe one row of the table as a draft-07 JSON Schema. Structure only;
/// row data is never included.
pub fn generate_json_schema(snapshot: &TableSnapshot) -> Value {
    let table = &snapshot.table;
    let mut properties = Map::new();
    let mut required = vec![json!(ROW_ID_KEY)];

    properties.insert(
        ROW_ID_KEY.to_string(),
        json!({ "type": "integer", "description": "Row id" }),
    );

    for column in snapshot.columns() {
        let key = cell_key(&column.name, ROW_ID_KEY, |k| table.column(k).is_some());
        let base = json_schema_type(column.data_type);
        let mut property = Map::new();
        if column.required {
            property.insert("type".into(), json!(base));
            required.push(json!(key));
        } else {
            property.insert("type".into(), json!([base, "null"]));
        }

        if let Some(values) = &column.enum_values {
            let mut allowed: Vec<Value> = values.iter().map(|v| json!(v)).collect();
            if !column.required {
                allowed.push(Value::Null);
            }
            property.insert("enum".into(), Value::Array(allowed));
        }
        if key != column.name {
            property.insert("x-column".into(), json!(column.name));
        }
        if let Some(default) = &column.default_value {
            property.insert("default".into(), default.clone());
        }
        if let Some(target) = column.reference_table_id {
            let description = match snapshot.referenced_tables.get(&target) {
                Some(name) => format!("Row id in table '{name}'"),
                None => format!("Row id in table {target}"),
            };
            property.insert("description".into(), json!(description));
            property.insert("x-reference-table".into(), json!(target));
        }
        property.insert("x-display-order".into(), json!(column.display_order));

        properties.insert(key, Value::Object(property));
    }

    let mut schema = json!({
        "$schema": DRAFT_07,
        "title": table.name,
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    });
    if let Some(description) = &table.description {
        schema["description"] = json!(description);
    }
    schema
}
