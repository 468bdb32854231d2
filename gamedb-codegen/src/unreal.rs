use gamedb::row::cell_key;
use gamedb::TableSnapshot;
use serde_json::{json, Map, Value};

use crate::type_utils::{row_type_name, unreal_type};

const ROW_NAME_KEY: &str = "Name";

/// Build an Unreal DataTable import document. Each row is keyed by `Name`
/// (the row id) and carries its cells as plain JSON values.
pub fn generate_unreal(snapshot: &TableSnapshot) -> Value {
    let table = &snapshot.table;
    let keys: Vec<String> = snapshot
        .columns()
        .iter()
        .map(|c| cell_key(&c.name, ROW_NAME_KEY, |k| table.column(k).is_some()))
        .collect();

    let columns: Vec<Value> = snapshot
        .columns()
        .iter()
        .zip(&keys)
        .map(|(column, key)| {
            let mut entry = json!({
                "Name": key,
                "Type": column.data_type.as_str(),
                "UnrealType": unreal_type(column.data_type),
                "Required": column.required,
            });
            if let Some(values) = &column.enum_values {
                entry["EnumValues"] = json!(values);
            }
            if let Some(target) = column.reference_table_id {
                entry["ReferenceTable"] = match snapshot.referenced_tables.get(&target) {
                    Some(name) => json!(name),
                    None => json!(target),
                };
            }
            if *key != column.name {
                entry["Column"] = json!(column.name);
            }
            entry
        })
        .collect();

    let rows: Vec<Value> = snapshot
        .rows
        .iter()
        .map(|row| {
            let mut entry = Map::new();
            entry.insert(ROW_NAME_KEY.to_string(), json!(row.id.to_string()));
            for (column, key) in snapshot.columns().iter().zip(&keys) {
                entry.insert(key.clone(), row.get(&column.name).to_json());
            }
            Value::Object(entry)
        })
        .collect();

    json!({
        "TableName": table.name,
        "RowStruct": format!("F{}Row", row_type_name(&table.name)),
        "Columns": columns,
        "Rows": rows,
    })
}
