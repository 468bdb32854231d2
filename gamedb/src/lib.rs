pub mod config;
pub mod error;
pub mod row;
pub mod schema;
pub mod store;
pub mod system_db;
pub mod validation;
pub mod version;

pub use config::StoreConfig;
pub use error::{GameDbError, Result, ValidationError};
pub use row::{CellValue, Cells, Row};
pub use schema::{Column, ColumnSpec, DataType, Project, ProjectDefinition, Table};
pub use store::{ColumnRemoval, RowUpdate, Store, TableSnapshot};
pub use version::{ChangeKey, ChangeSet, ChangeValue, Version, VersionOrder};
