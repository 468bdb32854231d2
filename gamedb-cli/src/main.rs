use clap::{Parser, Subcommand, ValueEnum};
use gamedb::schema::parse_definition;
use gamedb::{ChangeSet, ColumnSpec, DataType, Store, Version, VersionOrder};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process;

/// gamedb CLI: manage typed game-data tables and their version history
#[derive(Parser)]
#[command(name = "gamedb", version, about)]
struct Cli {
    /// Path to the data directory (default: current directory)
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    /// Author recorded on commits and rollbacks
    #[arg(long, env = "GAMEDB_AUTHOR", default_value = "cli")]
    author: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Create a project with its tables from a YAML definition
    Import {
        /// Path to the project definition
        file: PathBuf,
    },

    /// List projects
    Projects,

    /// Create an empty project
    CreateProject {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// List the tables of a project
    Tables {
        /// Project ID
        project: i64,
    },

    /// Create a table in a project
    CreateTable {
        /// Project ID
        project: i64,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Show the columns of a table
    Columns {
        /// Table ID
        table: i64,
    },

    /// Add a column to a table
    AddColumn {
        /// Table ID
        table: i64,
        name: String,
        /// string, integer, float, boolean, enum or reference
        #[arg(long = "type")]
        data_type: DataType,
        #[arg(long)]
        required: bool,
        /// Default value, coerced to the column type
        #[arg(long)]
        default: Option<String>,
        /// Allowed values of an enum column (e.g. --enum common,rare,epic)
        #[arg(long = "enum", value_delimiter = ',')]
        enum_values: Vec<String>,
        /// Target table ID of a reference column
        #[arg(long)]
        target: Option<i64>,
    },

    /// Remove a column and prune its values
    RemoveColumn {
        /// Table ID
        table: i64,
        /// Column ID
        column: i64,
        /// Commit the removal with this message
        #[arg(long)]
        commit: Option<String>,
    },

    /// Insert a new row
    Insert {
        /// Table ID
        table: i64,
        /// Cell values (e.g. --field name=Sword --field level=3)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// Commit the new row with this message
        #[arg(long)]
        commit: Option<String>,
    },

    /// Update cells of a row
    Update {
        /// Row ID
        row: i64,
        /// Cell values to set (e.g. --field rarity=epic)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// Columns to clear
        #[arg(long)]
        unset: Vec<String>,
        /// Commit the changed cells with this message
        #[arg(long)]
        commit: Option<String>,
    },

    /// Delete a row
    Delete {
        /// Row ID
        row: i64,
        /// Commit the deletion with this message
        #[arg(long)]
        commit: Option<String>,
    },

    /// List rows of a table
    List {
        /// Table ID
        table: i64,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Page size (0 = configured default)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },

    /// Record a commit from a change set file
    Commit {
        /// Project ID
        project: i64,
        /// Commit message
        message: String,
        /// Scope the commit to one table
        #[arg(long)]
        table: Option<i64>,
        /// JSON change set; empty when omitted
        #[arg(long)]
        changes: Option<PathBuf>,
    },

    /// Show the version history of a project
    Versions {
        /// Project ID
        project: i64,
        /// Only versions scoped to this table
        #[arg(long)]
        table: Option<i64>,
        /// Oldest first instead of newest first
        #[arg(long)]
        oldest_first: bool,
    },

    /// Show the change set of a version
    Diff {
        /// Version ID
        version: i64,
    },

    /// Restore the old values of a version as a new version
    Rollback {
        /// Version ID
        version: i64,
    },

    /// Export a table as unity, unreal or json
    Generate {
        /// Table ID
        table: i64,
        /// Export format
        target: String,
        /// Write to a directory instead of stdout
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&cli.data_dir)?;
    let store = Store::open(&cli.data_dir)?;
    log::debug!("Using data directory {}", cli.data_dir.display());
    let author = cli.author.as_str();
    let format = &cli.format;

    match cli.command {
        Command::Import { file } => {
            let definition = parse_definition(&file)?;
            let project = store.import_definition(&definition)?;
            let tables = store.list_tables(project.id)?;
            print_output(&json!({ "project": project, "tables": tables }), format)?;
        }

        Command::Projects => {
            print_output(&store.list_projects()?, format)?;
        }

        Command::CreateProject { name, description } => {
            let project = store.create_project(&name, description.as_deref())?;
            print_output(&project, format)?;
        }

        Command::Tables { project } => {
            print_output(&store.list_tables(project)?, format)?;
        }

        Command::CreateTable {
            project,
            name,
            description,
        } => {
            let table = store.create_table(project, &name, description.as_deref())?;
            print_output(&table, format)?;
        }

        Command::Columns { table } => {
            print_output(&store.list_columns(table)?, format)?;
        }

        Command::AddColumn {
            table,
            name,
            data_type,
            required,
            default,
            enum_values,
            target,
        } => {
            let spec = ColumnSpec {
                name,
                data_type,
                required,
                default_value: default.map(serde_json::Value::String),
                enum_values: (!enum_values.is_empty()).then_some(enum_values),
                reference_table_id: target,
            };
            print_output(&store.add_column(table, spec)?, format)?;
        }

        Command::RemoveColumn {
            table,
            column,
            commit,
        } => {
            let removal = store.remove_column(table, column)?;
            let version = record(&store, table, author, commit, &removal.changes)?;
            print_output(&json!({ "removed": removal.column, "version": version }), format)?;
        }

        Command::Insert {
            table,
            fields,
            commit,
        } => {
            let row = store.create_row(table, &fields_to_map(&fields))?;
            let version = record(&store, table, author, commit, &Store::creation_changes(&row))?;
            print_output(&json!({ "row": row.to_json(), "version": version }), format)?;
        }

        Command::Update {
            row,
            fields,
            unset,
            commit,
        } => {
            let mut map = fields_to_map(&fields);
            for column in unset {
                map.insert(column, serde_json::Value::Null);
            }
            let update = store.update_row(row, &map)?;
            let version = record(&store, update.row.table_id, author, commit, &update.changes)?;
            print_output(
                &json!({
                    "row": update.row.to_json(),
                    "changes": update.changes,
                    "version": version,
                }),
                format,
            )?;
        }

        Command::Delete { row, commit } => {
            let deleted = store.delete_row(row)?;
            let changes = Store::deletion_changes(&deleted);
            let version = record(&store, deleted.table_id, author, commit, &changes)?;
            print_output(&json!({ "deleted": deleted.to_json(), "version": version }), format)?;
        }

        Command::List {
            table,
            offset,
            limit,
        } => {
            let rows: Vec<_> = store
                .get_table_data(table, offset, limit)?
                .iter()
                .map(|r| r.to_json())
                .collect();
            print_output(&rows, format)?;
        }

        Command::Commit {
            project,
            message,
            table,
            changes,
        } => {
            let changes: ChangeSet = match changes {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(&path)?)?,
                None => ChangeSet::new(),
            };
            let version = store.commit(project, author, &message, &changes, table)?;
            print_output(&version, format)?;
        }

        Command::Versions {
            project,
            table,
            oldest_first,
        } => {
            let order = if oldest_first {
                VersionOrder::OldestFirst
            } else {
                VersionOrder::NewestFirst
            };
            let summaries: Vec<_> = store
                .list_versions(project, table, order)?
                .into_iter()
                .map(|v| {
                    json!({
                        "id": v.id,
                        "sequence": v.sequence,
                        "table_id": v.table_id,
                        "author": v.author,
                        "message": v.message,
                        "created_at": v.created_at,
                        "changes": v.changes.len(),
                    })
                })
                .collect();
            print_output(&summaries, format)?;
        }

        Command::Diff { version } => {
            print_output(&store.get_diff(version)?, format)?;
        }

        Command::Rollback { version } => {
            print_output(&store.rollback(version, author)?, format)?;
        }

        Command::Generate {
            table,
            target,
            out_dir,
        } => {
            let snapshot = store.snapshot(table)?;
            let code = gamedb_codegen::generate_named(&snapshot, &target)?;
            match out_dir {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)?;
                    let path = dir.join(&code.file_name);
                    std::fs::write(&path, &code.content)?;
                    print_output(&json!({ "ok": true, "file": path }), format)?;
                }
                None => print!("{}", code.content),
            }
        }
    }

    Ok(())
}

/// Commit `changes` against the table's project when a message was given.
fn record(
    store: &Store,
    table_id: i64,
    author: &str,
    message: Option<String>,
    changes: &ChangeSet,
) -> gamedb::Result<Option<Version>> {
    let Some(message) = message else {
        return Ok(None);
    };
    let project_id = store.get_table(table_id)?.project_id;
    store
        .commit(project_id, author, &message, changes, Some(table_id))
        .map(Some)
}

fn print_output<T: Serialize>(
    value: &T,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Field values stay text; coercion parses them for non-string columns.
fn fields_to_map(fields: &[(String, String)]) -> serde_json::Map<String, serde_json::Value> {
    fields
        .iter()
        .map(|(key, val)| (key.clone(), serde_json::Value::String(val.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamedb::{CellValue, StoreConfig};

    fn field(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("note=a=b").unwrap(), field("note", "a=b"));
        assert!(parse_key_value("name").is_err());
    }

    #[test]
    fn test_field_text_is_coerced_per_column() {
        let store = Store::open_in_memory(StoreConfig::default()).unwrap();
        let project = store.create_project("Dungeon", None).unwrap();
        let table = store.create_table(project.id, "Items", None).unwrap().id;
        store.add_column(table, ColumnSpec::new("name", DataType::String)).unwrap();
        store.add_column(table, ColumnSpec::new("level", DataType::Integer)).unwrap();
        store.add_column(table, ColumnSpec::new("cursed", DataType::Boolean)).unwrap();

        let fields = [field("name", "42"), field("level", "3"), field("cursed", "true")];
        let row = store.create_row(table, &fields_to_map(&fields)).unwrap();
        assert_eq!(row.get("name"), &CellValue::String("42".into()));
        assert_eq!(row.get("level"), &CellValue::Integer(3));
        assert_eq!(row.get("cursed"), &CellValue::Boolean(true));

        let row = store
            .create_row(table, &fields_to_map(&[field("name", "null")]))
            .unwrap();
        assert_eq!(row.get("name"), &CellValue::String("null".into()));
    }
}
