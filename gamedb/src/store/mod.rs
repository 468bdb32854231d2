pub(crate) mod columns;
mod locks;
pub(crate) mod rows;

pub use columns::ColumnRemoval;
pub use rows::RowUpdate;

use crate::config::StoreConfig;
use crate::error::{GameDbError, Result};
use crate::row::Row;
use crate::schema::{Column, ColumnSpec, Project, ProjectDefinition, Table};
use crate::system_db::{Records, SystemDb};
use locks::TableLocks;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{MutexGuard, PoisonError};

/// The main entry point for gamedb.
/// Owns the system database and the per-table write locks; every schema,
/// row and version operation goes through here.
pub struct Store {
    root: Option<PathBuf>,
    config: StoreConfig,
    pub(crate) db: SystemDb,
    locks: TableLocks,
}

/// Read-consistent copy of a table's schema and data.
#[derive(Debug, Clone, Serialize)]
pub struct TableSnapshot {
    pub table: Table,
    pub rows: Vec<Row>,
    /// Names of the tables that reference columns point at.
    pub referenced_tables: BTreeMap<i64, String>,
}

impl TableSnapshot {
    pub fn columns(&self) -> &[Column] {
        &self.table.columns
    }
}

impl Store {
    /// Open a store in the given data directory.
    /// Reads `gamedb.yaml` if present and opens/creates the database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(GameDbError::not_found("Data directory", root.display()));
        }

        let config = StoreConfig::load(&root)?;
        let db = SystemDb::open(&root.join(&config.database))?;
        log::debug!("Opened store at {}", root.display());

        Ok(Store {
            root: Some(root),
            config,
            db,
            locks: TableLocks::default(),
        })
    }

    /// Open a store backed by an in-memory database (for testing).
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        Ok(Store {
            root: None,
            config,
            db: SystemDb::open_in_memory()?,
            locks: TableLocks::default(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The data directory, if the store lives on disk.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Run `f` while holding the write locks of the given tables.
    pub(crate) fn exclusive<R>(&self, table_ids: &[i64], f: impl FnOnce() -> Result<R>) -> Result<R> {
        let handles = self.locks.handles(table_ids);
        let _guards: Vec<MutexGuard<'_, ()>> = handles
            .iter()
            .map(|h| h.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();
        f()
    }

    // ── Projects ─────────────────────────────────────────────────────

    pub fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let name = non_blank("Project", name)?;
        let project = self.db.write(|r| r.insert_project(name, description))?;
        log::info!("Created project {} '{}'", project.id, project.name);
        Ok(project)
    }

    pub fn get_project(&self, id: i64) -> Result<Project> {
        self.db
            .read(|r| r.get_project(id))?
            .ok_or_else(|| GameDbError::not_found("Project", id))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.db.read(|r| r.list_projects())
    }

    pub fn update_project(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Project> {
        self.db.write(|r| {
            let mut project = r
                .get_project(id)?
                .ok_or_else(|| GameDbError::not_found("Project", id))?;
            if let Some(name) = name {
                project.name = non_blank("Project", name)?.to_string();
            }
            if let Some(description) = description {
                project.description = Some(description.to_string());
            }
            r.update_project(&project)?;
            Ok(project)
        })
    }

    /// Delete a project with all of its tables, rows and versions.
    pub fn delete_project(&self, id: i64) -> Result<()> {
        let table_ids = self.project_table_ids(id)?;
        self.exclusive(&table_ids, || {
            if !self.db.write(|r| r.delete_project(id))? {
                return Err(GameDbError::not_found("Project", id));
            }
            Ok(())
        })?;
        for table_id in table_ids {
            self.locks.forget(table_id);
        }
        log::info!("Deleted project {id}");
        Ok(())
    }

    pub(crate) fn project_table_ids(&self, project_id: i64) -> Result<Vec<i64>> {
        let tables = self.db.read(|r| r.list_tables(project_id))?;
        Ok(tables.iter().map(|t| t.id).collect())
    }

    // ── Tables ───────────────────────────────────────────────────────

    pub fn create_table(
        &self,
        project_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Table> {
        let name = non_blank("Table", name)?;
        let table = self.db.write(|r| create_table_in(r, project_id, name, description))?;
        log::info!("Created table {} '{}' in project {project_id}", table.id, table.name);
        Ok(table)
    }

    /// Get a table with its ordered columns.
    pub fn get_table(&self, id: i64) -> Result<Table> {
        self.db
            .read(|r| r.get_table(id))?
            .ok_or_else(|| GameDbError::not_found("Table", id))
    }

    pub fn list_tables(&self, project_id: i64) -> Result<Vec<Table>> {
        self.db.read(|r| {
            r.get_project(project_id)?
                .ok_or_else(|| GameDbError::not_found("Project", project_id))?;
            r.list_tables(project_id)
        })
    }

    pub fn update_table(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Table> {
        self.exclusive(&[id], || {
            self.db.write(|r| {
                let mut table = r
                    .get_table(id)?
                    .ok_or_else(|| GameDbError::not_found("Table", id))?;
                if let Some(name) = name {
                    let name = non_blank("Table", name)?;
                    if name != table.name && r.find_table(table.project_id, name)?.is_some() {
                        return Err(GameDbError::InvalidSchema(format!(
                            "Table '{name}' already exists in project {}",
                            table.project_id
                        )));
                    }
                    table.name = name.to_string();
                }
                if let Some(description) = description {
                    table.description = Some(description.to_string());
                }
                r.update_table(&table)?;
                Ok(table)
            })
        })
    }

    /// Delete a table with its columns and rows. References from other
    /// tables are weak and are left as they are.
    pub fn delete_table(&self, id: i64) -> Result<()> {
        self.exclusive(&[id], || {
            if !self.db.write(|r| r.delete_table(id))? {
                return Err(GameDbError::not_found("Table", id));
            }
            Ok(())
        })?;
        self.locks.forget(id);
        log::info!("Deleted table {id}");
        Ok(())
    }

    /// Create a project with all tables and columns from a YAML definition.
    /// Everything is created in one write group.
    pub fn import_definition(&self, definition: &ProjectDefinition) -> Result<Project> {
        let name = non_blank("Project", &definition.name)?;

        let project = self.db.write(|r| {
            let project = r.insert_project(name, definition.description.as_deref())?;

            let mut table_ids = BTreeMap::new();
            for (table_name, table_def) in &definition.tables {
                let name = non_blank("Table", table_name)?;
                let table =
                    create_table_in(r, project.id, name, table_def.description.as_deref())?;
                table_ids.insert(table_name.clone(), table.id);
            }

            for (table_name, table_def) in &definition.tables {
                let table_id = table_ids[table_name];
                for column_def in &table_def.columns {
                    let reference_table_id = match &column_def.target {
                        Some(target) => Some(*table_ids.get(target).ok_or_else(|| {
                            GameDbError::InvalidSchema(format!(
                                "Column '{table_name}.{}' targets unknown table '{target}'",
                                column_def.name
                            ))
                        })?),
                        None => None,
                    };
                    let spec = ColumnSpec {
                        name: column_def.name.clone(),
                        data_type: column_def.data_type,
                        required: column_def.required,
                        default_value: column_def.default.clone(),
                        enum_values: column_def.enum_values.clone(),
                        reference_table_id,
                    };
                    columns::add_column_in(r, table_id, &spec)?;
                }
            }

            Ok(project)
        })?;

        log::info!(
            "Imported project {} '{}' with {} tables",
            project.id,
            project.name,
            definition.tables.len()
        );
        Ok(project)
    }

    /// Capture schema and rows of a table in one consistent read.
    pub fn snapshot(&self, table_id: i64) -> Result<TableSnapshot> {
        self.db.read(|r| {
            let table = r
                .get_table(table_id)?
                .ok_or_else(|| GameDbError::not_found("Table", table_id))?;
            let rows = r.all_rows(table_id)?;

            let mut referenced_tables = BTreeMap::new();
            for target in table.columns.iter().filter_map(|c| c.reference_table_id) {
                if let Some(target_table) = r.get_table(target)? {
                    referenced_tables.insert(target, target_table.name);
                }
            }

            Ok(TableSnapshot {
                table,
                rows,
                referenced_tables,
            })
        })
    }
}

fn create_table_in(
    r: &Records<'_>,
    project_id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<Table> {
    r.get_project(project_id)?
        .ok_or_else(|| GameDbError::not_found("Project", project_id))?;
    if r.find_table(project_id, name)?.is_some() {
        return Err(GameDbError::InvalidSchema(format!(
            "Table '{name}' already exists in project {project_id}"
        )));
    }
    r.insert_table(project_id, name, description)
}

fn non_blank<'a>(what: &str, name: &'a str) -> Result<&'a str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GameDbError::InvalidSchema(format!("{what} name cannot be empty")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{parse_definition_str, DataType};

    fn store() -> Store {
        Store::open_in_memory(StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_project_lifecycle() {
        let store = store();
        let project = store.create_project("Dungeon", Some("loot")).unwrap();
        assert_eq!(store.list_projects().unwrap().len(), 1);

        let renamed = store.update_project(project.id, Some("Crypt"), None).unwrap();
        assert_eq!(renamed.name, "Crypt");
        assert_eq!(renamed.description.as_deref(), Some("loot"));

        store.delete_project(project.id).unwrap();
        assert!(matches!(
            store.get_project(project.id),
            Err(GameDbError::NotFound { entity: "Project", .. })
        ));
    }

    #[test]
    fn test_blank_names_rejected() {
        let store = store();
        assert!(matches!(
            store.create_project("  ", None),
            Err(GameDbError::InvalidSchema(_))
        ));
        let project = store.create_project("P", None).unwrap();
        assert!(matches!(
            store.create_table(project.id, "", None),
            Err(GameDbError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_duplicate_table_name_rejected() {
        let store = store();
        let project = store.create_project("P", None).unwrap();
        store.create_table(project.id, "Items", None).unwrap();
        assert!(matches!(
            store.create_table(project.id, "Items", None),
            Err(GameDbError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_table_in_unknown_project() {
        let store = store();
        assert!(matches!(
            store.create_table(42, "Items", None),
            Err(GameDbError::NotFound { entity: "Project", .. })
        ));
    }

    #[test]
    fn test_delete_table_cascades_rows() {
        let store = store();
        let project = store.create_project("P", None).unwrap();
        let table = store.create_table(project.id, "Items", None).unwrap();
        let row = store.create_row(table.id, &serde_json::Map::new()).unwrap();

        store.delete_table(table.id).unwrap();
        assert!(store.get_table(table.id).is_err());
        assert!(store.get_row(row.id).is_err());
    }

    #[test]
    fn test_import_definition() {
        let store = store();
        let definition = parse_definition_str(
            r#"
name: Dungeon
tables:
  Weapons:
    columns:
      - { name: name, type: string, required: true }
  Items:
    columns:
      - { name: name, type: string, required: true }
      - { name: rarity, type: enum, enum: [common, rare, epic], default: common }
      - { name: weapon, type: reference, target: Weapons }
"#,
        )
        .unwrap();

        let project = store.import_definition(&definition).unwrap();
        let tables = store.list_tables(project.id).unwrap();
        assert_eq!(tables.len(), 2);

        let weapons = tables.iter().find(|t| t.name == "Weapons").unwrap();
        let items = tables.iter().find(|t| t.name == "Items").unwrap();
        let weapon = items.column("weapon").unwrap();
        assert_eq!(weapon.data_type, DataType::Reference);
        assert_eq!(weapon.reference_table_id, Some(weapons.id));

        let names: Vec<_> = items.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "rarity", "weapon"]);
    }

    #[test]
    fn test_import_unknown_target_creates_nothing() {
        let store = store();
        let definition = parse_definition_str(
            r#"
name: Broken
tables:
  Items:
    columns:
      - { name: owner, type: reference, target: Players }
"#,
        )
        .unwrap();

        assert!(matches!(
            store.import_definition(&definition),
            Err(GameDbError::InvalidSchema(_))
        ));
        assert!(store.list_projects().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_includes_reference_names() {
        let store = store();
        let project = store.create_project("P", None).unwrap();
        let weapons = store.create_table(project.id, "Weapons", None).unwrap();
        let items = store.create_table(project.id, "Items", None).unwrap();
        store
            .add_column(items.id, ColumnSpec::new("weapon", DataType::Reference).referencing(weapons.id))
            .unwrap();
        store.create_row(items.id, &serde_json::Map::new()).unwrap();

        let snapshot = store.snapshot(items.id).unwrap();
        assert_eq!(snapshot.columns().len(), 1);
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.referenced_tables.get(&weapons.id).map(String::as_str), Some("Weapons"));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gamedb.yaml"), "database: data.sqlite\n").unwrap();

        {
            let store = Store::open(dir.path()).unwrap();
            store.create_project("Persisted", None).unwrap();
        }

        assert!(dir.path().join("data.sqlite").exists());
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.list_projects().unwrap()[0].name, "Persisted");
    }

    #[test]
    fn test_open_missing_directory() {
        assert!(Store::open("/definitely/not/here").is_err());
    }
}
