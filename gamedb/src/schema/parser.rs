use super::types::ProjectDefinition;
use crate::error::Result;
use std::path::Path;

/// Parse a project definition file.
pub fn parse_definition(path: &Path) -> Result<ProjectDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_definition_str(&content)
}

/// Parse a project definition from a YAML string.
pub fn parse_definition_str(content: &str) -> Result<ProjectDefinition> {
    let definition: ProjectDefinition = serde_yaml::from_str(content)?;
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;

    #[test]
    fn test_parse_definition() {
        let def = parse_definition_str(
            r#"
name: Dungeon
description: Loot tables
tables:
  Weapons:
    columns:
      - { name: name, type: string, required: true }
  Items:
    description: Everything droppable
    columns:
      - { name: name, type: string, required: true }
      - { name: rarity, type: enum, enum: [common, rare, epic], default: common }
      - { name: weapon, type: reference, target: Weapons }
      - { name: weight, type: float, default: 1.5 }
"#,
        )
        .unwrap();

        assert_eq!(def.name, "Dungeon");
        assert_eq!(def.tables.len(), 2);

        let items = &def.tables["Items"];
        assert_eq!(items.columns.len(), 4);
        assert_eq!(items.columns[1].data_type, DataType::Enum);
        assert_eq!(
            items.columns[1].enum_values.as_deref(),
            Some(&["common".to_string(), "rare".to_string(), "epic".to_string()][..])
        );
        assert_eq!(items.columns[2].target.as_deref(), Some("Weapons"));
        assert_eq!(items.columns[3].default, Some(serde_json::json!(1.5)));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = parse_definition_str(
            r#"
name: Broken
tables:
  T:
    columns:
      - { name: when, type: datetime }
"#,
        );
        assert!(result.is_err());
    }
}
