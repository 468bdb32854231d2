//! gamedb code generation - exports a table snapshot to engine formats.
//!
//! The main entry point is [`generate`], which takes a [`TableSnapshot`]
//! captured by [`gamedb::Store::snapshot`] and renders it as Unity C#, an
//! Unreal DataTable document or a JSON Schema. Generation is a pure function
//! of the snapshot and never touches the store.

mod json_schema;
pub mod type_utils;
mod unity;
mod unreal;

use gamedb::{GameDbError, Result, TableSnapshot};
use std::fmt;
use std::str::FromStr;

/// Supported export targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Unity,
    Unreal,
    Json,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Unity, ExportFormat::Unreal, ExportFormat::Json];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Unity => "unity",
            ExportFormat::Unreal => "unreal",
            ExportFormat::Json => "json",
        }
    }

    /// Suggested file extension, including the dot.
    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Unity => ".cs",
            ExportFormat::Unreal | ExportFormat::Json => ".json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Unity => "text/x-csharp",
            ExportFormat::Unreal | ExportFormat::Json => "application/json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = GameDbError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| GameDbError::UnknownFormat(s.to_string()))
    }
}

/// Names of all supported formats.
pub fn supported_formats() -> Vec<&'static str> {
    ExportFormat::ALL.iter().map(ExportFormat::as_str).collect()
}

/// Rendered output plus what a caller needs to offer it as a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub file_name: String,
    pub content: String,
    pub mime_type: &'static str,
}

/// Render a snapshot in the given format.
pub fn generate(snapshot: &TableSnapshot, format: ExportFormat) -> Result<GeneratedCode> {
    let content = match format {
        ExportFormat::Unity => unity::generate_unity(snapshot),
        ExportFormat::Unreal => serde_json::to_string_pretty(&unreal::generate_unreal(snapshot))?,
        ExportFormat::Json => {
            serde_json::to_string_pretty(&json_schema::generate_json_schema(snapshot))?
        }
    };

    log::debug!(
        "Generated {format} export for table '{}' ({} bytes)",
        snapshot.table.name,
        content.len()
    );

    Ok(GeneratedCode {
        file_name: format!(
            "{}{}",
            type_utils::type_name(&snapshot.table.name),
            format.file_extension()
        ),
        content,
        mime_type: format.mime_type(),
    })
}

/// Like [`generate`] but takes the format by name, failing with
/// `UnknownFormat` for anything unsupported.
pub fn generate_named(snapshot: &TableSnapshot, format: &str) -> Result<GeneratedCode> {
    generate(snapshot, format.parse()?)
}
