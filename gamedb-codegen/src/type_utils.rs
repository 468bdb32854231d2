use gamedb::schema::{Column, DataType};
use heck::{ToLowerCamelCase, ToPascalCase};

/// Convert a table name to its singular PascalCase row type name.
/// e.g. "items" -> "Item", "Enemies" -> "Enemy", "loot_tables" -> "LootTable"
pub fn row_type_name(table_name: &str) -> String {
    type_name(&singularize(table_name))
}

/// PascalCase type name for a table, e.g. "loot tables" -> "LootTables".
pub fn type_name(name: &str) -> String {
    let pascal = name.to_pascal_case();
    if pascal.is_empty() {
        return "Table".to_string();
    }
    leading_digit_safe(pascal)
}

/// Generate an enum name from table singular + column name.
/// e.g. ("Items", "rarity") -> "ItemRarity"
pub fn enum_type_name(table_name: &str, column_name: &str) -> String {
    format!("{}{}", row_type_name(table_name), column_name.to_pascal_case())
}

/// C# enum member for an enum value, e.g. "very rare" -> "VeryRare", "2h" -> "_2h".
pub fn enum_variant_name(value: &str) -> String {
    let pascal = value.to_pascal_case();
    if pascal.is_empty() {
        return "Unnamed".to_string();
    }
    leading_digit_safe(pascal)
}

/// C# field name for a column: lowerCamelCase, `@`-escaped when it is a keyword.
pub fn field_name(column_name: &str) -> String {
    let camel = column_name.to_lower_camel_case();
    if camel.is_empty() {
        return "field".to_string();
    }
    if is_csharp_keyword(&camel) {
        return format!("@{camel}");
    }
    leading_digit_safe(camel)
}

/// C# type of a column's field. Enum columns use their generated enum and
/// reference columns hold the target row id.
pub fn csharp_type(column: &Column, table_name: &str) -> String {
    match column.data_type {
        DataType::String => "string".to_string(),
        DataType::Integer | DataType::Reference => "long".to_string(),
        DataType::Float => "float".to_string(),
        DataType::Boolean => "bool".to_string(),
        DataType::Enum => enum_type_name(table_name, &column.name),
    }
}

/// Unreal property type for a column.
pub fn unreal_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String => "FString",
        DataType::Integer | DataType::Reference => "int64",
        DataType::Float => "float",
        DataType::Boolean => "bool",
        DataType::Enum => "FName",
    }
}

/// JSON Schema primitive type for a column.
pub fn json_schema_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String | DataType::Enum => "string",
        DataType::Integer | DataType::Reference => "integer",
        DataType::Float => "number",
        DataType::Boolean => "boolean",
    }
}

/// Naive singularization of English words.
pub fn singularize(word: &str) -> String {
    let lower = word.to_lowercase();
    let cut = |n: usize| word.get(..word.len() - n).unwrap_or(word).to_string();
    if lower.ends_with("ies") && word.len() > 3 {
        format!("{}y", cut(3))
    } else if lower.ends_with("ses") || lower.ends_with("xes") || lower.ends_with("zes") {
        cut(2)
    } else if lower.ends_with("ves") {
        format!("{}f", cut(3))
    } else if lower.ends_with('s') && !lower.ends_with("ss") && word.len() > 1 {
        cut(1)
    } else {
        word.to_string()
    }
}

fn leading_digit_safe(ident: String) -> String {
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{ident}")
    } else {
        ident
    }
}

fn is_csharp_keyword(name: &str) -> bool {
    matches!(
        name,
        "abstract" | "as" | "base" | "bool" | "break" | "byte" | "case" | "catch" | "char"
            | "checked" | "class" | "const" | "continue" | "decimal" | "default" | "delegate"
            | "do" | "double" | "else" | "enum" | "event" | "explicit" | "extern" | "false"
            | "finally" | "fixed" | "float" | "for" | "foreach" | "goto" | "if" | "implicit"
            | "in" | "int" | "interface" | "internal" | "is" | "lock" | "long" | "namespace"
            | "new" | "null" | "object" | "operator" | "out" | "override" | "params"
            | "private" | "protected" | "public" | "readonly" | "ref" | "return" | "sbyte"
            | "sealed" | "short" | "sizeof" | "stackalloc" | "static" | "string" | "struct"
            | "switch" | "this" | "throw" | "true" | "try" | "typeof" | "uint" | "ulong"
            | "unchecked" | "unsafe" | "ushort" | "using" | "virtual" | "void" | "volatile"
            | "while"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("Items"), "Item");
        assert_eq!(singularize("enemies"), "enemy");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("Wolves"), "Wolf");
        assert_eq!(singularize("Armor"), "Armor");
        assert_eq!(singularize("Glass"), "Glass");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(type_name("loot tables"), "LootTables");
        assert_eq!(row_type_name("loot_tables"), "LootTable");
        assert_eq!(type_name("3d models"), "_3dModels");
        assert_eq!(enum_type_name("Items", "rarity"), "ItemRarity");
    }

    #[test]
    fn test_enum_variant_name() {
        assert_eq!(enum_variant_name("very rare"), "VeryRare");
        assert_eq!(enum_variant_name("2h"), "_2h");
        assert_eq!(enum_variant_name("!!"), "Unnamed");
    }

    #[test]
    fn test_field_name_escapes_keywords() {
        assert_eq!(field_name("max_hp"), "maxHp");
        assert_eq!(field_name("class"), "@class");
        assert_eq!(field_name("Event"), "@event");
        assert_eq!(field_name("1st"), "_1st");
    }
}
