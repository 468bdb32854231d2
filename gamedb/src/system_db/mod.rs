use crate::error::{GameDbError, Result};
use crate::row::{Cells, Row};
use crate::schema::{Column, DataType, Project, Table};
use crate::validation::ReferenceCheck;
use crate::version::{ChangeSet, Version, VersionOrder};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The storage collaborator: projects, tables, columns, rows and versions in
/// a single SQLite database.
///
/// All writes go through one connection, so SQLite runs write groups one at
/// a time. On disk the database is in WAL mode and reads use their own
/// read-only connections: they see the last committed write group and never
/// wait for one in flight.
pub struct SystemDb {
    writer: Mutex<Connection>,
    /// `None` for in-memory databases, where reads share the writer.
    readers: Option<ReaderPool>,
}

struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl SystemDb {
    /// Open or create the system database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        log::debug!("Opened {} (journal mode {mode})", path.display());

        let mut db = Self::from_connection(conn)?;
        db.readers = Some(ReaderPool {
            path: path.to_path_buf(),
            idle: Mutex::new(Vec::new()),
        });
        Ok(db)
    }

    /// Open an in-memory system database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        initialize_tables(&conn)?;
        Ok(SystemDb {
            writer: Mutex::new(conn),
            readers: None,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite itself consistent
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run reads against a consistent view of the database.
    pub fn read<R>(&self, f: impl FnOnce(&Records<'_>) -> Result<R>) -> Result<R> {
        let Some(pool) = &self.readers else {
            let conn = self.lock();
            return f(&Records { conn: &conn });
        };

        let mut conn = pool.take()?;
        let result = {
            // Dropping the transaction ends the read snapshot
            let tx = conn.transaction()?;
            f(&Records { conn: &tx })
        };
        pool.give_back(conn);
        result
    }

    /// Run a group of writes atomically. Any error rolls back every write
    /// made by `f`.
    pub fn write<R>(&self, f: impl FnOnce(&Records<'_>) -> Result<R>) -> Result<R> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let result = f(&Records { conn: &tx })?;
        tx.commit()?;
        Ok(result)
    }
}

impl ReaderPool {
    fn take(&self) -> Result<Connection> {
        let idle = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        if let Some(conn) = idle {
            return Ok(conn);
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn give_back(&self, conn: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }
}

fn initialize_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tables_meta (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            UNIQUE (project_id, name)
        );

        CREATE TABLE IF NOT EXISTS columns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES tables_meta(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            data_type TEXT NOT NULL,
            required INTEGER NOT NULL DEFAULT 0,
            default_json TEXT,
            enum_json TEXT,
            reference_table_id INTEGER,
            display_order INTEGER NOT NULL,
            UNIQUE (table_id, name)
        );

        CREATE TABLE IF NOT EXISTS table_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES tables_meta(id) ON DELETE CASCADE,
            cells_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_table_rows_table ON table_rows(table_id, id);

        CREATE TABLE IF NOT EXISTS versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            table_id INTEGER,
            sequence INTEGER NOT NULL,
            author TEXT NOT NULL,
            message TEXT NOT NULL,
            changes_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (project_id, sequence)
        );

        CREATE INDEX IF NOT EXISTS idx_versions_project ON versions(project_id, sequence);
        ",
    )?;
    Ok(())
}

/// Record-level operations, valid both inside and outside a write group.
pub struct Records<'c> {
    conn: &'c Connection,
}

const COLUMN_FIELDS: &str =
    "id, table_id, name, data_type, required, default_json, enum_json, reference_table_id, display_order";
const ROW_FIELDS: &str = "id, table_id, cells_json, created_at, updated_at";
const VERSION_FIELDS: &str =
    "id, project_id, table_id, sequence, author, message, changes_json, created_at";

impl<'c> Records<'c> {
    // ── Projects ─────────────────────────────────────────────────────

    pub fn insert_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO projects (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, created_at],
        )?;
        Ok(Project {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at,
        })
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT id, name, description, created_at FROM projects WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM projects ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;

        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    pub fn update_project(&self, project: &Project) -> Result<()> {
        self.conn.execute(
            "UPDATE projects SET name = ?2, description = ?3 WHERE id = ?1",
            params![project.id, project.name, project.description],
        )?;
        Ok(())
    }

    /// Delete a project and, through cascades, everything it owns.
    pub fn delete_project(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // ── Tables ───────────────────────────────────────────────────────

    pub fn insert_table(
        &self,
        project_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Table> {
        self.conn.execute(
            "INSERT INTO tables_meta (project_id, name, description) VALUES (?1, ?2, ?3)",
            params![project_id, name, description],
        )?;
        Ok(Table {
            id: self.conn.last_insert_rowid(),
            project_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            columns: Vec::new(),
        })
    }

    /// Get a table with its ordered columns.
    pub fn get_table(&self, id: i64) -> Result<Option<Table>> {
        let table = self
            .conn
            .query_row(
                "SELECT id, project_id, name, description FROM tables_meta WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Table {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        columns: Vec::new(),
                    })
                },
            )
            .optional()?;

        match table {
            Some(mut table) => {
                table.columns = self.list_columns(table.id)?;
                Ok(Some(table))
            }
            None => Ok(None),
        }
    }

    pub fn find_table(&self, project_id: i64, name: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM tables_meta WHERE project_id = ?1 AND name = ?2",
                params![project_id, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn list_tables(&self, project_id: i64) -> Result<Vec<Table>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM tables_meta WHERE project_id = ?1 ORDER BY id")?;
        let ids = stmt.query_map(params![project_id], |row| row.get::<_, i64>(0))?;

        let mut tables = Vec::new();
        for id in ids {
            if let Some(table) = self.get_table(id?)? {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    pub fn update_table(&self, table: &Table) -> Result<()> {
        self.conn.execute(
            "UPDATE tables_meta SET name = ?2, description = ?3 WHERE id = ?1",
            params![table.id, table.name, table.description],
        )?;
        Ok(())
    }

    pub fn delete_table(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM tables_meta WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // ── Columns ──────────────────────────────────────────────────────

    /// Insert a column. A column id of 0 asks for a fresh id; any other id is
    /// kept, which is how restored columns get their identity back.
    pub fn insert_column(&self, column: &Column) -> Result<i64> {
        let id = (column.id != 0).then_some(column.id);
        let default_json = column
            .default_value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let enum_json = column
            .enum_values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT INTO columns (id, table_id, name, data_type, required, default_json, enum_json, reference_table_id, display_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                column.table_id,
                column.name,
                column.data_type.as_str(),
                column.required,
                default_json,
                enum_json,
                column.reference_table_id,
                column.display_order,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_column(&self, id: i64) -> Result<Option<Column>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {COLUMN_FIELDS} FROM columns WHERE id = ?1"),
                params![id],
                ColumnRecord::from_row,
            )
            .optional()?;
        record.map(ColumnRecord::into_column).transpose()
    }

    /// Columns of a table ordered by display order, then id.
    pub fn list_columns(&self, table_id: i64) -> Result<Vec<Column>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMN_FIELDS} FROM columns WHERE table_id = ?1 ORDER BY display_order, id"
        ))?;
        let records = stmt.query_map(params![table_id], ColumnRecord::from_row)?;

        let mut columns = Vec::new();
        for record in records {
            columns.push(record?.into_column()?);
        }
        Ok(columns)
    }

    pub fn next_display_order(&self, table_id: i64) -> Result<i64> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(display_order) FROM columns WHERE table_id = ?1",
            params![table_id],
            |row| row.get(0),
        )?;
        Ok(max.map_or(0, |m| m + 1))
    }

    pub fn delete_column(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM columns WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // ── Rows ─────────────────────────────────────────────────────────

    /// Insert a row. `id` is only given when a deleted row is restored.
    pub fn insert_row(&self, id: Option<i64>, table_id: i64, cells: &Cells) -> Result<Row> {
        let now = Utc::now();
        let cells_json = serde_json::to_string(cells)?;
        self.conn.execute(
            "INSERT INTO table_rows (id, table_id, cells_json, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, table_id, cells_json, now],
        )?;
        Ok(Row {
            id: self.conn.last_insert_rowid(),
            table_id,
            cells: cells.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_row(&self, id: i64) -> Result<Option<Row>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {ROW_FIELDS} FROM table_rows WHERE id = ?1"),
                params![id],
                RowRecord::from_row,
            )
            .optional()?;
        record.map(RowRecord::into_row).transpose()
    }

    pub fn update_row_cells(&self, id: i64, cells: &Cells) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let cells_json = serde_json::to_string(cells)?;
        let n = self.conn.execute(
            "UPDATE table_rows SET cells_json = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, cells_json, now],
        )?;
        if n == 0 {
            return Err(GameDbError::not_found("Row", id));
        }
        Ok(now)
    }

    pub fn delete_row(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM table_rows WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// A page of rows ordered by id.
    pub fn list_rows(&self, table_id: i64, offset: usize, limit: usize) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROW_FIELDS} FROM table_rows WHERE table_id = ?1 ORDER BY id LIMIT ?2 OFFSET ?3"
        ))?;
        let records = stmt.query_map(
            params![table_id, limit as i64, offset as i64],
            RowRecord::from_row,
        )?;

        let mut rows = Vec::new();
        for record in records {
            rows.push(record?.into_row()?);
        }
        Ok(rows)
    }

    pub fn all_rows(&self, table_id: i64) -> Result<Vec<Row>> {
        self.list_rows(table_id, 0, i64::MAX as usize)
    }

    pub fn count_rows(&self, table_id: i64) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM table_rows WHERE table_id = ?1",
            params![table_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    // ── Versions ─────────────────────────────────────────────────────

    /// Append a version at the next sequence position of its project.
    pub fn insert_version(
        &self,
        project_id: i64,
        table_id: Option<i64>,
        author: &str,
        message: &str,
        changes: &ChangeSet,
    ) -> Result<Version> {
        let sequence: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM versions WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        let created_at = Utc::now();
        let changes_json = serde_json::to_string(changes)?;

        self.conn.execute(
            "INSERT INTO versions (project_id, table_id, sequence, author, message, changes_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![project_id, table_id, sequence, author, message, changes_json, created_at],
        )?;

        Ok(Version {
            id: self.conn.last_insert_rowid(),
            project_id,
            table_id,
            sequence,
            author: author.to_string(),
            message: message.to_string(),
            created_at,
            changes: changes.clone(),
        })
    }

    pub fn get_version(&self, id: i64) -> Result<Option<Version>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {VERSION_FIELDS} FROM versions WHERE id = ?1"),
                params![id],
                VersionRecord::from_row,
            )
            .optional()?;
        record.map(VersionRecord::into_version).transpose()
    }

    pub fn list_versions(
        &self,
        project_id: i64,
        table_id: Option<i64>,
        order: VersionOrder,
    ) -> Result<Vec<Version>> {
        let direction = match order {
            VersionOrder::NewestFirst => "DESC",
            VersionOrder::OldestFirst => "ASC",
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VERSION_FIELDS} FROM versions
             WHERE project_id = ?1 AND (?2 IS NULL OR table_id = ?2)
             ORDER BY sequence {direction}"
        ))?;
        let records = stmt.query_map(params![project_id, table_id], VersionRecord::from_row)?;

        let mut versions = Vec::new();
        for record in records {
            versions.push(record?.into_version()?);
        }
        Ok(versions)
    }
}

impl ReferenceCheck for Records<'_> {
    fn row_exists(&self, table_id: i64, row_id: i64) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM table_rows WHERE id = ?1 AND table_id = ?2",
                params![row_id, table_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

// ── Raw records ──────────────────────────────────────────────────────
// JSON payloads are decoded outside the rusqlite row callbacks so decode
// failures surface as JSON errors.

struct ColumnRecord {
    id: i64,
    table_id: i64,
    name: String,
    data_type: String,
    required: bool,
    default_json: Option<String>,
    enum_json: Option<String>,
    reference_table_id: Option<i64>,
    display_order: i64,
}

impl ColumnRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(ColumnRecord {
            id: row.get(0)?,
            table_id: row.get(1)?,
            name: row.get(2)?,
            data_type: row.get(3)?,
            required: row.get(4)?,
            default_json: row.get(5)?,
            enum_json: row.get(6)?,
            reference_table_id: row.get(7)?,
            display_order: row.get(8)?,
        })
    }

    fn into_column(self) -> Result<Column> {
        let data_type: DataType = self
            .data_type
            .parse()
            .map_err(GameDbError::InvalidSchema)?;
        Ok(Column {
            id: self.id,
            table_id: self.table_id,
            name: self.name,
            data_type,
            required: self.required,
            default_value: self
                .default_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            enum_values: self
                .enum_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            reference_table_id: self.reference_table_id,
            display_order: self.display_order,
        })
    }
}

struct RowRecord {
    id: i64,
    table_id: i64,
    cells_json: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RowRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(RowRecord {
            id: row.get(0)?,
            table_id: row.get(1)?,
            cells_json: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_row(self) -> Result<Row> {
        Ok(Row {
            id: self.id,
            table_id: self.table_id,
            cells: serde_json::from_str(&self.cells_json)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct VersionRecord {
    id: i64,
    project_id: i64,
    table_id: Option<i64>,
    sequence: i64,
    author: String,
    message: String,
    changes_json: String,
    created_at: DateTime<Utc>,
}

impl VersionRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(VersionRecord {
            id: row.get(0)?,
            project_id: row.get(1)?,
            table_id: row.get(2)?,
            sequence: row.get(3)?,
            author: row.get(4)?,
            message: row.get(5)?,
            changes_json: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_version(self) -> Result<Version> {
        Ok(Version {
            id: self.id,
            project_id: self.project_id,
            table_id: self.table_id,
            sequence: self.sequence,
            author: self.author,
            message: self.message,
            changes: serde_json::from_str(&self.changes_json)?,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::CellValue;

    fn seeded() -> (SystemDb, i64) {
        let db = SystemDb::open_in_memory().unwrap();
        let table_id = db
            .write(|r| {
                let project = r.insert_project("Dungeon", None)?;
                Ok(r.insert_table(project.id, "Items", Some("loot"))?.id)
            })
            .unwrap();
        (db, table_id)
    }

    fn column(table_id: i64, name: &str, order: i64) -> Column {
        Column {
            id: 0,
            table_id,
            name: name.to_string(),
            data_type: DataType::Enum,
            required: true,
            default_value: Some(serde_json::json!("common")),
            enum_values: Some(vec!["common".into(), "rare".into()]),
            reference_table_id: None,
            display_order: order,
        }
    }

    #[test]
    fn test_column_round_trip_and_order() {
        let (db, table_id) = seeded();
        db.write(|r| {
            r.insert_column(&column(table_id, "second", 1))?;
            r.insert_column(&column(table_id, "first", 0))?;
            Ok(())
        })
        .unwrap();

        let table = db.read(|r| r.get_table(table_id)).unwrap().unwrap();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(table.columns[0].default_value, Some(serde_json::json!("common")));
        assert_eq!(db.read(|r| r.next_display_order(table_id)).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_column_name_rejected_by_storage() {
        let (db, table_id) = seeded();
        db.write(|r| r.insert_column(&column(table_id, "rarity", 0))).unwrap();
        assert!(db.write(|r| r.insert_column(&column(table_id, "rarity", 1))).is_err());
    }

    #[test]
    fn test_rows_paginate_by_id() {
        let (db, table_id) = seeded();
        db.write(|r| {
            for i in 0..5 {
                let mut cells = Cells::new();
                cells.insert("n".into(), CellValue::Integer(i));
                r.insert_row(None, table_id, &cells)?;
            }
            Ok(())
        })
        .unwrap();

        let page = db.read(|r| r.list_rows(table_id, 1, 2)).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].get("n"), &CellValue::Integer(1));
        assert_eq!(page[1].get("n"), &CellValue::Integer(2));
        assert_eq!(db.read(|r| r.count_rows(table_id)).unwrap(), 5);
    }

    #[test]
    fn test_restored_row_keeps_id() {
        let (db, table_id) = seeded();
        let row = db
            .write(|r| r.insert_row(None, table_id, &Cells::new()))
            .unwrap();
        db.write(|r| r.delete_row(row.id)).unwrap();
        assert!(db.read(|r| r.get_row(row.id)).unwrap().is_none());

        let restored = db
            .write(|r| r.insert_row(Some(row.id), table_id, &Cells::new()))
            .unwrap();
        assert_eq!(restored.id, row.id);
    }

    #[test]
    fn test_write_group_is_atomic() {
        let (db, table_id) = seeded();
        let result: Result<()> = db.write(|r| {
            r.insert_row(None, table_id, &Cells::new())?;
            Err(GameDbError::EmptyMessage)
        });
        assert!(result.is_err());
        assert_eq!(db.read(|r| r.count_rows(table_id)).unwrap(), 0);
    }

    #[test]
    fn test_reads_on_disk_do_not_wait_for_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = SystemDb::open(&dir.path().join("gamedb.sqlite")).unwrap();
        db.write(|r| r.insert_project("Committed", None)).unwrap();

        let seen_during_write = db
            .write(|r| {
                r.insert_project("In flight", None)?;
                db.read(|reader| reader.list_projects())
            })
            .unwrap();
        assert_eq!(seen_during_write.len(), 1);
        assert_eq!(seen_during_write[0].name, "Committed");
        assert_eq!(db.read(|r| r.list_projects()).unwrap().len(), 2);
    }

    #[test]
    fn test_version_sequence_per_project() {
        let db = SystemDb::open_in_memory().unwrap();
        let (a, b) = db
            .write(|r| {
                Ok((
                    r.insert_project("A", None)?.id,
                    r.insert_project("B", None)?.id,
                ))
            })
            .unwrap();

        let changes = ChangeSet::new();
        let v1 = db.write(|r| r.insert_version(a, None, "ana", "one", &changes)).unwrap();
        let v2 = db.write(|r| r.insert_version(a, None, "ana", "two", &changes)).unwrap();
        let other = db.write(|r| r.insert_version(b, None, "bo", "one", &changes)).unwrap();

        assert_eq!((v1.sequence, v2.sequence, other.sequence), (1, 2, 1));

        let newest = db
            .read(|r| r.list_versions(a, None, VersionOrder::NewestFirst))
            .unwrap();
        assert_eq!(newest.iter().map(|v| v.id).collect::<Vec<_>>(), vec![v2.id, v1.id]);
    }

    #[test]
    fn test_project_delete_cascades() {
        let (db, table_id) = seeded();
        let project_id = db.read(|r| r.get_table(table_id)).unwrap().unwrap().project_id;
        db.write(|r| {
            r.insert_column(&column(table_id, "rarity", 0))?;
            r.insert_row(None, table_id, &Cells::new())?;
            r.insert_version(project_id, Some(table_id), "ana", "init", &ChangeSet::new())?;
            Ok(())
        })
        .unwrap();

        assert!(db.write(|r| r.delete_project(project_id)).unwrap());
        assert!(db.read(|r| r.get_table(table_id)).unwrap().is_none());
        assert_eq!(db.read(|r| r.count_rows(table_id)).unwrap(), 0);
        assert!(db
            .read(|r| r.list_versions(project_id, None, VersionOrder::OldestFirst))
            .unwrap()
            .is_empty());
    }
}
