mod changeset;
mod rollback;

pub use changeset::{
    Change, ChangeEntry, ChangeKey, ChangeSet, ChangeValue, DuplicateChangeKey, SchemaEntity,
};

use crate::error::{GameDbError, Result};
use crate::store::Store;
use crate::system_db::Records;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A commit: an immutable, labelled change set at a position in its
/// project's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: i64,
    pub project_id: i64,
    /// `None` for project-wide commits.
    pub table_id: Option<i64>,
    /// Position within the project, starting at 1.
    pub sequence: i64,
    pub author: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub changes: ChangeSet,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionOrder {
    /// Most recent first, for display.
    #[default]
    NewestFirst,
    /// Oldest first, for replaying history.
    OldestFirst,
}

impl Store {
    /// Record a commit with a caller-supplied change set. An empty change set
    /// is allowed. Holds the write lock of the scoped table, or of every
    /// table in the project for project-wide commits.
    pub fn commit(
        &self,
        project_id: i64,
        author: &str,
        message: &str,
        changes: &ChangeSet,
        table_scope: Option<i64>,
    ) -> Result<Version> {
        let message = message.trim();
        if message.is_empty() {
            return Err(GameDbError::EmptyMessage);
        }

        let locked = match table_scope {
            Some(table_id) => vec![table_id],
            None => self.project_table_ids(project_id)?,
        };

        let version = self.exclusive(&locked, || {
            self.db.write(|r| {
                r.get_project(project_id)?
                    .ok_or_else(|| GameDbError::not_found("Project", project_id))?;
                if let Some(table_id) = table_scope {
                    let table = r
                        .get_table(table_id)?
                        .filter(|t| t.project_id == project_id)
                        .ok_or_else(|| GameDbError::not_found("Table", table_id))?;
                    log::debug!("Commit scoped to table '{}'", table.name);
                }
                check_ownership(r, project_id, table_scope, changes)?;
                r.insert_version(project_id, table_scope, author, message, changes)
            })
        })?;

        log::info!(
            "Committed version {} (#{} in project {project_id}) by {author}: {} changes",
            version.id,
            version.sequence,
            version.changes.len()
        );
        Ok(version)
    }

    pub fn get_version(&self, version_id: i64) -> Result<Version> {
        self.db
            .read(|r| r.get_version(version_id))?
            .ok_or_else(|| GameDbError::not_found("Version", version_id))
    }

    /// The stored change set of a version, exactly as committed.
    pub fn get_diff(&self, version_id: i64) -> Result<ChangeSet> {
        Ok(self.get_version(version_id)?.changes)
    }

    /// Versions of a project, optionally only those scoped to one table.
    pub fn list_versions(
        &self,
        project_id: i64,
        table_scope: Option<i64>,
        order: VersionOrder,
    ) -> Result<Vec<Version>> {
        self.db.read(|r| {
            r.get_project(project_id)?
                .ok_or_else(|| GameDbError::not_found("Project", project_id))?;
            r.list_versions(project_id, table_scope, order)
        })
    }
}

/// Every entry must touch a table of the project, and only the scoped table
/// when there is one. Cell entries of rows that no longer exist pass; they
/// cannot be rolled back anyway.
pub(crate) fn check_ownership(
    r: &Records<'_>,
    project_id: i64,
    table_scope: Option<i64>,
    changes: &ChangeSet,
) -> Result<()> {
    for (key, change) in changes.iter() {
        let mut touched = Vec::new();
        for value in [&change.old_value, &change.new_value] {
            match value {
                ChangeValue::Column(column) => touched.push(column.table_id),
                ChangeValue::Row(row) => touched.push(row.table_id),
                ChangeValue::Cell(_) | ChangeValue::Absent => {}
            }
        }
        let current = match key {
            ChangeKey::Cell { row_id, .. }
            | ChangeKey::Schema {
                entity: SchemaEntity::Row,
                entity_id: row_id,
            } => r.get_row(*row_id)?.map(|row| row.table_id),
            ChangeKey::Schema {
                entity: SchemaEntity::Column,
                entity_id,
            } => r.get_column(*entity_id)?.map(|column| column.table_id),
        };
        touched.extend(current);

        for table_id in touched {
            if let Some(scope) = table_scope.filter(|scope| *scope != table_id) {
                return Err(GameDbError::InvalidSchema(format!(
                    "Change entry {key} touches table {table_id}, outside the commit's table {scope}"
                )));
            }
            match r.get_table(table_id)? {
                Some(table) if table.project_id == project_id => {}
                Some(table) => {
                    return Err(GameDbError::InvalidSchema(format!(
                        "Change entry {key} touches table '{}' of project {}",
                        table.name, table.project_id
                    )))
                }
                None => {
                    return Err(GameDbError::InvalidSchema(format!(
                        "Change entry {key} touches table {table_id}, which does not exist"
                    )))
                }
            }
        }
    }
    Ok(())
}
