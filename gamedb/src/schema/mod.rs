mod parser;
mod types;

pub use parser::{parse_definition, parse_definition_str};
pub use types::{
    Column, ColumnDefinition, ColumnSpec, DataType, Project, ProjectDefinition, Table,
    TableDefinition,
};
