use thiserror::Error;

/// A cell value that could not be accepted for its column.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Column '{column}' is required")]
    MissingRequiredValue { column: String },

    #[error("Column '{column}' expected {expected}, got {value}")]
    InvalidValue {
        column: String,
        expected: &'static str,
        value: String,
    },

    #[error("Column '{column}' value '{value}' is not one of {allowed:?}")]
    InvalidEnumValue {
        column: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Column '{column}' references row {row_id} which does not exist in table {table_id}")]
    DanglingReference {
        column: String,
        table_id: i64,
        row_id: i64,
    },

    #[error("Column '{column}' is not defined on the table")]
    UnknownColumn { column: String },

    #[error("Row {row_id} no longer exists")]
    RowNotFound { row_id: i64 },

    #[error("Column '{column}' cannot be restored: a column with that name already exists")]
    ColumnConflict { column: String },

    #[error("Change entry {key} carries a value of the wrong kind")]
    MalformedChange { key: String },

    #[error("{reason}")]
    SchemaRejected { reason: String },
}

#[derive(Error, Debug)]
pub enum GameDbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Commit message must not be empty")]
    EmptyMessage,

    #[error("Rollback of version {version_id} failed: {source}")]
    RollbackFailed {
        version_id: i64,
        #[source]
        source: ValidationError,
    },

    #[error("Unknown export format: {0}")]
    UnknownFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl GameDbError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        GameDbError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// The validation failure behind this error, if it is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            GameDbError::Validation(e) => Some(e),
            GameDbError::RollbackFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GameDbError>;
