use super::Store;
use crate::error::{GameDbError, Result, ValidationError};
use crate::row::Row;
use crate::system_db::Records;
use crate::validation::{coerce_partial, resolve_new_row};
use crate::version::{Change, ChangeKey, ChangeSet, ChangeValue};
use serde::Serialize;

type Fields = serde_json::Map<String, serde_json::Value>;

/// A row after an update, with the before/after pair of every cell whose
/// value changed.
#[derive(Debug, Clone, Serialize)]
pub struct RowUpdate {
    pub row: Row,
    pub changes: ChangeSet,
}

impl Store {
    /// Create a row. Missing cells take the column default, unknown keys are
    /// ignored. Nothing is written unless every column resolves.
    pub fn create_row(&self, table_id: i64, fields: &Fields) -> Result<Row> {
        let row = self.exclusive(&[table_id], || {
            self.db.write(|r| create_row_in(r, table_id, fields))
        })?;
        log::debug!("Created row {} in table {table_id}", row.id);
        Ok(row)
    }

    /// Update some cells of a row. Every supplied key must name a column and
    /// coerce; otherwise nothing changes.
    pub fn update_row(&self, row_id: i64, fields: &Fields) -> Result<RowUpdate> {
        let table_id = self.get_row(row_id)?.table_id;
        let update = self.exclusive(&[table_id], || {
            self.db.write(|r| update_row_in(r, row_id, fields))
        })?;
        log::debug!(
            "Updated row {row_id} in table {table_id} ({} cells changed)",
            update.changes.len()
        );
        Ok(update)
    }

    /// Delete a row, returning its last state. Deletion is not versioned
    /// here; see [`Store::deletion_changes`].
    pub fn delete_row(&self, row_id: i64) -> Result<Row> {
        let table_id = self.get_row(row_id)?.table_id;
        let row = self.exclusive(&[table_id], || {
            self.db.write(|r| {
                let row = r
                    .get_row(row_id)?
                    .ok_or_else(|| GameDbError::not_found("Row", row_id))?;
                r.delete_row(row_id)?;
                Ok(row)
            })
        })?;
        log::debug!("Deleted row {row_id} from table {table_id}");
        Ok(row)
    }

    pub fn get_row(&self, row_id: i64) -> Result<Row> {
        self.db
            .read(|r| r.get_row(row_id))?
            .ok_or_else(|| GameDbError::not_found("Row", row_id))
    }

    /// A page of rows ordered by id. A limit of 0 asks for the configured
    /// default page size; larger limits are clamped.
    pub fn get_table_data(&self, table_id: i64, offset: usize, limit: usize) -> Result<Vec<Row>> {
        let limit = self.config().page_limit(limit);
        self.db.read(|r| {
            r.get_table(table_id)?
                .ok_or_else(|| GameDbError::not_found("Table", table_id))?;
            r.list_rows(table_id, offset, limit)
        })
    }

    pub fn count_rows(&self, table_id: i64) -> Result<usize> {
        self.db.read(|r| r.count_rows(table_id))
    }

    /// Change entry recording that `row` was created.
    pub fn creation_changes(row: &Row) -> ChangeSet {
        let mut changes = ChangeSet::new();
        changes.insert(
            ChangeKey::row(row.id),
            Change::new(ChangeValue::Absent, ChangeValue::Row(row.clone())),
        );
        changes
    }

    /// Change entry recording that `row` was deleted.
    pub fn deletion_changes(row: &Row) -> ChangeSet {
        Self::creation_changes(row).inverse()
    }
}

pub(crate) fn create_row_in(r: &Records<'_>, table_id: i64, fields: &Fields) -> Result<Row> {
    let table = r
        .get_table(table_id)?
        .ok_or_else(|| GameDbError::not_found("Table", table_id))?;
    let cells = resolve_new_row(&table.columns, fields, r)?;
    r.insert_row(None, table_id, &cells)
}

pub(crate) fn update_row_in(r: &Records<'_>, row_id: i64, fields: &Fields) -> Result<RowUpdate> {
    let mut row = r
        .get_row(row_id)?
        .ok_or_else(|| GameDbError::not_found("Row", row_id))?;
    let table = r
        .get_table(row.table_id)?
        .ok_or_else(|| GameDbError::not_found("Table", row.table_id))?;

    let coerced = coerce_partial(&table.columns, fields, r)?;
    let mut changes = ChangeSet::new();
    for (name, new) in coerced {
        let old = row.get(&name).clone();
        if old != new {
            changes.record_cell(row.id, &name, old, new.clone());
            row.cells.insert(name, new);
        }
    }

    if !changes.is_empty() {
        row.updated_at = r.update_row_cells(row.id, &row.cells)?;
    }
    Ok(RowUpdate { row, changes })
}

/// Re-insert a deleted row under its original id. Cells are re-validated
/// against the current schema; a stored value for a column that no longer
/// exists is rejected.
pub(crate) fn restore_row_in(r: &Records<'_>, row: &Row) -> Result<Row> {
    let table = r
        .get_table(row.table_id)?
        .ok_or_else(|| GameDbError::not_found("Table", row.table_id))?;
    if r.get_row(row.id)?.is_some() {
        return Err(GameDbError::InvalidSchema(format!("Row {} already exists", row.id)));
    }

    let mut fields = Fields::new();
    for (name, value) in row.cells.iter().filter(|(_, v)| !v.is_null()) {
        if table.column(name).is_none() {
            return Err(ValidationError::UnknownColumn {
                column: name.clone(),
            }
            .into());
        }
        fields.insert(name.clone(), value.to_json());
    }

    let cells = resolve_new_row(&table.columns, &fields, r)?;
    r.insert_row(Some(row.id), row.table_id, &cells)
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::error::{GameDbError, ValidationError};
    use crate::row::CellValue;
    use crate::schema::{ColumnSpec, DataType};
    use crate::store::Store;
    use crate::version::{ChangeKey, ChangeValue};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    fn items(config: StoreConfig) -> (Store, i64) {
        let store = Store::open_in_memory(config).unwrap();
        let project = store.create_project("Dungeon", None).unwrap();
        let table = store.create_table(project.id, "Items", None).unwrap();
        store
            .add_column(table.id, ColumnSpec::new("name", DataType::String).required())
            .unwrap();
        store
            .add_column(
                table.id,
                ColumnSpec::new("rarity", DataType::Enum)
                    .with_enum_values(["common", "rare", "epic"])
                    .with_default("common"),
            )
            .unwrap();
        store
            .add_column(table.id, ColumnSpec::new("level", DataType::Integer))
            .unwrap();
        (store, table.id)
    }

    #[test]
    fn test_create_row_resolves_defaults() {
        let (store, table) = items(StoreConfig::default());
        let row = store
            .create_row(table, &fields(json!({"name": "Sword", "bogus": 1})))
            .unwrap();

        assert_eq!(row.get("name"), &CellValue::String("Sword".into()));
        assert_eq!(row.get("rarity"), &CellValue::EnumValue("common".into()));
        assert_eq!(row.get("level"), &CellValue::Null);
        assert!(!row.cells.contains_key("bogus"));
    }

    #[test]
    fn test_create_row_is_all_or_nothing() {
        let (store, table) = items(StoreConfig::default());
        let err = store
            .create_row(table, &fields(json!({"name": "Sword", "level": "ten"})))
            .unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::InvalidValue { .. })
        ));
        assert_eq!(store.count_rows(table).unwrap(), 0);
    }

    #[test]
    fn test_update_reports_changed_cells_only() {
        let (store, table) = items(StoreConfig::default());
        let row = store
            .create_row(table, &fields(json!({"name": "Sword", "rarity": "rare"})))
            .unwrap();

        let update = store
            .update_row(row.id, &fields(json!({"name": "Sword", "rarity": "epic"})))
            .unwrap();
        assert_eq!(update.changes.len(), 1);

        let change = update.changes.get(&ChangeKey::cell(row.id, "rarity")).unwrap();
        assert_eq!(change.old_value, ChangeValue::Cell(CellValue::EnumValue("rare".into())));
        assert_eq!(change.new_value, ChangeValue::Cell(CellValue::EnumValue("epic".into())));
        assert_eq!(
            store.get_row(row.id).unwrap().get("rarity"),
            &CellValue::EnumValue("epic".into())
        );
    }

    #[test]
    fn test_update_rejects_whole_payload() {
        let (store, table) = items(StoreConfig::default());
        let row = store.create_row(table, &fields(json!({"name": "Sword"}))).unwrap();

        let err = store
            .update_row(row.id, &fields(json!({"level": 3, "rarity": "legendary"})))
            .unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::InvalidEnumValue { .. })
        ));
        assert_eq!(store.get_row(row.id).unwrap().get("level"), &CellValue::Null);

        assert!(matches!(
            store.update_row(row.id, &fields(json!({"name": null}))).unwrap_err().validation(),
            Some(ValidationError::MissingRequiredValue { .. })
        ));
        assert!(matches!(
            store.update_row(row.id, &fields(json!({"weight": 2}))).unwrap_err().validation(),
            Some(ValidationError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_missing_rows() {
        let (store, _) = items(StoreConfig::default());
        assert!(matches!(
            store.update_row(404, &fields(json!({}))),
            Err(GameDbError::NotFound { entity: "Row", .. })
        ));
        assert!(matches!(
            store.delete_row(404),
            Err(GameDbError::NotFound { entity: "Row", .. })
        ));
    }

    #[test]
    fn test_delete_row_returns_snapshot() {
        let (store, table) = items(StoreConfig::default());
        let row = store.create_row(table, &fields(json!({"name": "Sword"}))).unwrap();

        let deleted = store.delete_row(row.id).unwrap();
        assert_eq!(deleted, row);
        assert!(store.get_row(row.id).is_err());

        let changes = Store::deletion_changes(&deleted);
        let change = changes.get(&ChangeKey::row(row.id)).unwrap();
        assert_eq!(change.old_value, ChangeValue::Row(row));
        assert_eq!(change.new_value, ChangeValue::Absent);
    }

    #[test]
    fn test_table_data_pages_are_clamped() {
        let config = StoreConfig {
            default_page_size: 2,
            max_page_size: 3,
            ..StoreConfig::default()
        };
        let (store, table) = items(config);
        for i in 0..5 {
            store
                .create_row(table, &fields(json!({"name": format!("Item {i}")})))
                .unwrap();
        }

        assert_eq!(store.get_table_data(table, 0, 0).unwrap().len(), 2);
        assert_eq!(store.get_table_data(table, 0, 50).unwrap().len(), 3);

        let tail = store.get_table_data(table, 3, 10).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].get("name"), &CellValue::String("Item 3".into()));
        assert!(tail[0].id < tail[1].id);
    }
}
