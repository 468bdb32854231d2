use super::{check_ownership, Change, ChangeKey, ChangeSet, ChangeValue, SchemaEntity, Version};
use crate::error::{GameDbError, Result, ValidationError};
use crate::row::CellValue;
use crate::schema::Column;
use crate::store::columns::{remove_column_in, restore_column_in};
use crate::store::rows::{restore_row_in, update_row_in};
use crate::store::Store;
use crate::system_db::Records;
use std::collections::BTreeSet;

impl Store {
    /// Restore every old value recorded in a version and record the result as
    /// a new version whose change set is the inverse of what was restored.
    ///
    /// All restorations go through the same validation as live edits and run
    /// in one write group with the affected tables locked: either every entry
    /// is restored and the new version exists, or nothing changed.
    pub fn rollback(&self, version_id: i64, author: &str) -> Result<Version> {
        let target = self.get_version(version_id)?;
        let locked = self.affected_tables(&target)?;

        let result = self.exclusive(&locked, || {
            self.db.write(|r| {
                let inverse = restore(r, &target).map_err(|e| rollback_failed(target.id, e))?;
                let message = format!("Rollback of version {}: {}", target.id, target.message);
                r.insert_version(target.project_id, target.table_id, author, &message, &inverse)
            })
        });

        match &result {
            Ok(version) => log::info!(
                "Rolled back version {version_id} as version {} ({} changes)",
                version.id,
                version.changes.len()
            ),
            Err(e) => log::warn!("Rollback of version {version_id} rejected: {e}"),
        }
        result
    }

    fn affected_tables(&self, version: &Version) -> Result<Vec<i64>> {
        let mut tables: BTreeSet<i64> = match version.table_id {
            Some(table_id) => BTreeSet::from([table_id]),
            None => self.project_table_ids(version.project_id)?.into_iter().collect(),
        };

        self.db.read(|r| {
            for (key, change) in version.changes.iter() {
                for value in [&change.old_value, &change.new_value] {
                    match value {
                        ChangeValue::Column(column) => {
                            tables.insert(column.table_id);
                        }
                        ChangeValue::Row(row) => {
                            tables.insert(row.table_id);
                        }
                        _ => {}
                    }
                }
                if let ChangeKey::Cell { row_id, .. } = key {
                    if let Some(row) = r.get_row(*row_id)? {
                        tables.insert(row.table_id);
                    }
                }
            }
            Ok(())
        })?;

        Ok(tables.into_iter().collect())
    }
}

/// Apply the old values of `version` and return the inverse change set.
///
/// Order matters: removed columns and deleted rows come back first so cell
/// entries can land on them, and added rows and columns go last so cell
/// entries touching them still validate.
fn restore(r: &Records<'_>, version: &Version) -> Result<ChangeSet> {
    check_ownership(r, version.project_id, version.table_id, &version.changes)?;

    let mut inverse = ChangeSet::new();
    let mut restored_columns: Vec<&Column> = Vec::new();

    // Columns removed by the version
    for (key, change) in schema_entries(version, SchemaEntity::Column) {
        match (&change.old_value, &change.new_value) {
            (ChangeValue::Column(column), ChangeValue::Absent) if key_id(key) == column.id => {
                restore_column_in(r, column)?;
                inverse.insert(key.clone(), change.inverse());
                restored_columns.push(column);
            }
            (ChangeValue::Absent, ChangeValue::Column(column)) if key_id(key) == column.id => {}
            _ => return Err(malformed(key)),
        }
    }

    // Rows deleted by the version
    for (key, change) in schema_entries(version, SchemaEntity::Row) {
        match (&change.old_value, &change.new_value) {
            (ChangeValue::Row(row), ChangeValue::Absent) if key_id(key) == row.id => {
                let restored = restore_row_in(r, row)?;
                inverse.insert(
                    key.clone(),
                    Change::new(ChangeValue::Absent, ChangeValue::Row(restored)),
                );
            }
            (ChangeValue::Absent, ChangeValue::Row(row)) if key_id(key) == row.id => {}
            _ => return Err(malformed(key)),
        }
    }

    // Cell values
    for (key, change) in version.changes.iter() {
        let ChangeKey::Cell { row_id, column } = key else {
            continue;
        };
        let (ChangeValue::Cell(old), ChangeValue::Cell(_)) = (&change.old_value, &change.new_value)
        else {
            return Err(malformed(key));
        };

        let current = r
            .get_row(*row_id)?
            .ok_or(ValidationError::RowNotFound { row_id: *row_id })?;
        let before = current.get(column).clone();

        let mut fields = serde_json::Map::new();
        fields.insert(column.clone(), old.to_json());
        let update = update_row_in(r, *row_id, &fields)?;

        inverse.record_cell(*row_id, column, before, update.row.get(column).clone());
    }

    // Rows created by the version
    for (key, change) in schema_entries(version, SchemaEntity::Row) {
        if let ChangeValue::Absent = change.old_value {
            let row_id = key_id(key);
            let current = r
                .get_row(row_id)?
                .ok_or(ValidationError::RowNotFound { row_id })?;
            r.delete_row(row_id)?;
            inverse.insert(
                key.clone(),
                Change::new(ChangeValue::Row(current), ChangeValue::Absent),
            );
        }
    }

    // Columns added by the version
    for (key, change) in schema_entries(version, SchemaEntity::Column) {
        if let ChangeValue::Absent = change.old_value {
            let column_id = key_id(key);
            let current = r
                .get_column(column_id)?
                .ok_or_else(|| GameDbError::not_found("Column", column_id))?;
            for (cell_key, pruned) in remove_column_in(r, &current)? {
                let old_value = match inverse.get(&cell_key) {
                    Some(restored) => restored.old_value.clone(),
                    None => pruned.old_value,
                };
                inverse.insert(cell_key, Change::new(old_value, pruned.new_value));
            }
            inverse.insert(
                key.clone(),
                Change::new(ChangeValue::Column(current), ChangeValue::Absent),
            );
        }
    }

    // A restored required column must end up with a value in every row
    for column in restored_columns.iter().filter(|c| c.required) {
        for row in r.all_rows(column.table_id)? {
            if row.get(&column.name) == &CellValue::Null {
                return Err(ValidationError::MissingRequiredValue {
                    column: column.name.clone(),
                }
                .into());
            }
        }
    }

    Ok(inverse)
}

fn schema_entries(
    version: &Version,
    entity: SchemaEntity,
) -> impl Iterator<Item = (&ChangeKey, &Change)> {
    version.changes.iter().filter(move |(key, _)| {
        matches!(key, ChangeKey::Schema { entity: e, .. } if *e == entity)
    })
}

fn key_id(key: &ChangeKey) -> i64 {
    match key {
        ChangeKey::Schema { entity_id, .. } => *entity_id,
        ChangeKey::Cell { row_id, .. } => *row_id,
    }
}

fn malformed(key: &ChangeKey) -> GameDbError {
    ValidationError::MalformedChange {
        key: key.to_string(),
    }
    .into()
}

/// Wrap a restoration failure. Storage failures pass through unchanged.
fn rollback_failed(version_id: i64, err: GameDbError) -> GameDbError {
    let source = match err {
        GameDbError::Validation(v) => v,
        GameDbError::NotFound { .. } | GameDbError::InvalidSchema(_) => {
            ValidationError::SchemaRejected {
                reason: err.to_string(),
            }
        }
        other => return other,
    };
    GameDbError::RollbackFailed { version_id, source }
}
