use super::Store;
use crate::error::{GameDbError, Result, ValidationError};
use crate::row::CellValue;
use crate::schema::{Column, ColumnSpec, DataType};
use crate::system_db::Records;
use crate::validation::coerce_default;
use crate::version::{Change, ChangeKey, ChangeSet, ChangeValue};
use serde::Serialize;
use std::collections::HashSet;

/// Result of removing a column: the removed definition plus a change set
/// holding the column entry and every pruned non-null cell.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnRemoval {
    pub column: Column,
    pub changes: ChangeSet,
}

impl Store {
    /// Add a column to a table. Existing rows are back-filled with the
    /// column's default, or null when it has none.
    pub fn add_column(&self, table_id: i64, spec: ColumnSpec) -> Result<Column> {
        let column = self.exclusive(&[table_id], || {
            self.db.write(|r| add_column_in(r, table_id, &spec))
        })?;
        log::info!(
            "Added column {} '{}' ({}) to table {table_id}",
            column.id,
            column.name,
            column.data_type
        );
        Ok(column)
    }

    /// Remove a column and prune its cells from every row of the table.
    pub fn remove_column(&self, table_id: i64, column_id: i64) -> Result<ColumnRemoval> {
        let removal = self.exclusive(&[table_id], || {
            self.db.write(|r| {
                let column = r
                    .get_column(column_id)?
                    .filter(|c| c.table_id == table_id)
                    .ok_or_else(|| GameDbError::not_found("Column", column_id))?;
                let mut changes = remove_column_in(r, &column)?;
                changes.insert(
                    ChangeKey::column(column.id),
                    Change::new(ChangeValue::Column(column.clone()), ChangeValue::Absent),
                );
                Ok(ColumnRemoval { column, changes })
            })
        })?;
        log::info!(
            "Removed column {} '{}' from table {table_id}",
            removal.column.id,
            removal.column.name
        );
        Ok(removal)
    }

    pub fn get_column(&self, column_id: i64) -> Result<Column> {
        self.db
            .read(|r| r.get_column(column_id))?
            .ok_or_else(|| GameDbError::not_found("Column", column_id))
    }

    /// Columns of a table in display order.
    pub fn list_columns(&self, table_id: i64) -> Result<Vec<Column>> {
        Ok(self.get_table(table_id)?.columns)
    }
}

pub(crate) fn add_column_in(r: &Records<'_>, table_id: i64, spec: &ColumnSpec) -> Result<Column> {
    let table = r
        .get_table(table_id)?
        .ok_or_else(|| GameDbError::InvalidSchema(format!("Table {table_id} does not exist")))?;

    let name = spec.name.trim();
    if name.is_empty() {
        return Err(GameDbError::InvalidSchema("Column name cannot be empty".into()));
    }
    if table.column(name).is_some() {
        return Err(GameDbError::InvalidSchema(format!(
            "Column '{name}' already exists on table '{}'",
            table.name
        )));
    }

    let mut column = Column {
        id: 0,
        table_id,
        name: name.to_string(),
        data_type: spec.data_type,
        required: spec.required,
        default_value: spec.default_value.clone().filter(|v| !v.is_null()),
        enum_values: None,
        reference_table_id: None,
        display_order: r.next_display_order(table_id)?,
    };

    match spec.data_type {
        DataType::Enum => {
            let values = spec.enum_values.clone().unwrap_or_default();
            if values.is_empty() {
                return Err(GameDbError::InvalidSchema(format!(
                    "Enum column '{name}' needs at least one value"
                )));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = values.iter().find(|v| !seen.insert(v.as_str())) {
                return Err(GameDbError::InvalidSchema(format!(
                    "Enum column '{name}' lists '{dup}' more than once"
                )));
            }
            column.enum_values = Some(values);
        }
        DataType::Reference => {
            let target_id = spec.reference_table_id.ok_or_else(|| {
                GameDbError::InvalidSchema(format!("Reference column '{name}' needs a target table"))
            })?;
            let target = r.get_table(target_id)?.ok_or_else(|| {
                GameDbError::InvalidSchema(format!(
                    "Reference column '{name}' targets unknown table {target_id}"
                ))
            })?;
            if target.project_id != table.project_id {
                return Err(GameDbError::InvalidSchema(format!(
                    "Reference column '{name}' targets table '{}' in another project",
                    target.name
                )));
            }
            column.reference_table_id = Some(target_id);
        }
        _ => {}
    }

    let default = coerce_default(&column, r)?;
    if column.required && default.is_null() && r.count_rows(table_id)? > 0 {
        return Err(GameDbError::InvalidSchema(format!(
            "Required column '{name}' needs a default because table '{}' already has rows",
            table.name
        )));
    }

    column.id = r.insert_column(&column)?;
    backfill(r, &column, &default)?;
    Ok(column)
}

/// Re-add a removed column with its original identity. Rows are back-filled
/// with null; restored cell entries fill them in afterwards.
pub(crate) fn restore_column_in(r: &Records<'_>, column: &Column) -> Result<()> {
    let table = r
        .get_table(column.table_id)?
        .ok_or_else(|| GameDbError::not_found("Table", column.table_id))?;
    if table.column(&column.name).is_some() || r.get_column(column.id)?.is_some() {
        return Err(ValidationError::ColumnConflict {
            column: column.name.clone(),
        }
        .into());
    }
    if let Some(target_id) = column.reference_table_id {
        if r.get_table(target_id)?.is_none() {
            return Err(GameDbError::InvalidSchema(format!(
                "Reference column '{}' targets unknown table {target_id}",
                column.name
            )));
        }
    }
    coerce_default(column, r)?;

    r.insert_column(column)?;
    backfill(r, column, &CellValue::Null)
}

/// Drop a column and prune its cells. Returns the pruned non-null values as
/// cell entries.
pub(crate) fn remove_column_in(r: &Records<'_>, column: &Column) -> Result<ChangeSet> {
    let mut changes = ChangeSet::new();
    for mut row in r.all_rows(column.table_id)? {
        if let Some(old) = row.cells.remove(&column.name) {
            if !old.is_null() {
                changes.record_cell(row.id, &column.name, old, CellValue::Null);
            }
            r.update_row_cells(row.id, &row.cells)?;
        }
    }
    r.delete_column(column.id)?;
    Ok(changes)
}

fn backfill(r: &Records<'_>, column: &Column, value: &CellValue) -> Result<()> {
    for mut row in r.all_rows(column.table_id)? {
        if !row.cells.contains_key(&column.name) {
            row.cells.insert(column.name.clone(), value.clone());
            r.update_row_cells(row.id, &row.cells)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::error::GameDbError;
    use crate::row::CellValue;
    use crate::schema::{ColumnSpec, DataType};
    use crate::store::Store;
    use crate::version::{ChangeKey, ChangeValue};
    use serde_json::json;

    fn items() -> (Store, i64) {
        let store = Store::open_in_memory(StoreConfig::default()).unwrap();
        let project = store.create_project("Dungeon", None).unwrap();
        let table = store.create_table(project.id, "Items", None).unwrap();
        (store, table.id)
    }

    fn fields(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_add_column_assigns_display_order() {
        let (store, table) = items();
        let a = store.add_column(table, ColumnSpec::new("name", DataType::String)).unwrap();
        let b = store.add_column(table, ColumnSpec::new("level", DataType::Integer)).unwrap();
        assert_eq!((a.display_order, b.display_order), (0, 1));
        assert_eq!(store.list_columns(table).unwrap().len(), 2);
    }

    #[test]
    fn test_add_column_rejections() {
        let (store, table) = items();
        store.add_column(table, ColumnSpec::new("name", DataType::String)).unwrap();

        let cases = vec![
            ColumnSpec::new(" ", DataType::String),
            ColumnSpec::new("name", DataType::Integer),
            ColumnSpec::new("rarity", DataType::Enum),
            ColumnSpec::new("rarity", DataType::Enum).with_enum_values(["rare", "rare"]),
            ColumnSpec::new("owner", DataType::Reference),
            ColumnSpec::new("owner", DataType::Reference).referencing(999),
            ColumnSpec::new("level", DataType::Integer).with_default("high"),
        ];
        for spec in cases {
            let name = spec.name.clone();
            assert!(
                matches!(store.add_column(table, spec), Err(GameDbError::InvalidSchema(_))),
                "column '{name}' should be rejected"
            );
        }
    }

    #[test]
    fn test_add_column_to_unknown_table() {
        let (store, _) = items();
        assert!(matches!(
            store.add_column(404, ColumnSpec::new("name", DataType::String)),
            Err(GameDbError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_reference_to_other_project_rejected() {
        let (store, table) = items();
        let other = store.create_project("Other", None).unwrap();
        let foreign = store.create_table(other.id, "Players", None).unwrap();
        assert!(matches!(
            store.add_column(table, ColumnSpec::new("owner", DataType::Reference).referencing(foreign.id)),
            Err(GameDbError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_required_column_on_populated_table() {
        let (store, table) = items();
        store.create_row(table, &fields(json!({}))).unwrap();

        assert!(matches!(
            store.add_column(table, ColumnSpec::new("name", DataType::String).required()),
            Err(GameDbError::InvalidSchema(_))
        ));

        store
            .add_column(
                table,
                ColumnSpec::new("level", DataType::Integer).required().with_default(1),
            )
            .unwrap();
        let rows = store.get_table_data(table, 0, 0).unwrap();
        assert_eq!(rows[0].get("level"), &CellValue::Integer(1));
    }

    #[test]
    fn test_remove_column_prunes_cells() {
        let (store, table) = items();
        let rarity = store
            .add_column(table, ColumnSpec::new("rarity", DataType::Enum).with_enum_values(["common", "rare"]))
            .unwrap();
        let rare = store.create_row(table, &fields(json!({"rarity": "rare"}))).unwrap();
        store.create_row(table, &fields(json!({}))).unwrap();

        let removal = store.remove_column(table, rarity.id).unwrap();
        assert_eq!(removal.changes.len(), 2);
        assert_eq!(
            removal.changes.get(&ChangeKey::column(rarity.id)).unwrap().old_value,
            ChangeValue::Column(rarity.clone())
        );
        assert_eq!(
            removal.changes.get(&ChangeKey::cell(rare.id, "rarity")).unwrap().old_value,
            ChangeValue::Cell(CellValue::EnumValue("rare".into()))
        );

        let row = store.get_row(rare.id).unwrap();
        assert!(!row.cells.contains_key("rarity"));
        assert!(store.list_columns(table).unwrap().is_empty());
    }

    #[test]
    fn test_remove_missing_column() {
        let (store, table) = items();
        assert!(matches!(
            store.remove_column(table, 77),
            Err(GameDbError::NotFound { entity: "Column", .. })
        ));
    }
}
