use gamedb::schema::DataType;
use gamedb::TableSnapshot;
use std::collections::HashSet;

use crate::type_utils::{csharp_type, enum_type_name, enum_variant_name, field_name, row_type_name, type_name};

/// Generate a C# source file: one enum per enum column, a serializable row
/// class and a ScriptableObject container with id lookup.
pub fn generate_unity(snapshot: &TableSnapshot) -> String {
    let table = &snapshot.table;
    let row_type = row_type_name(&table.name);
    let database_type = format!("{}Database", type_name(&table.name));
    let mut w = CSharpWriter::default();

    w.line("// <auto-generated>");
    w.line(format!("// Generated by gamedb from table '{}'.", table.name));
    w.line("// </auto-generated>");
    w.line("using System;");
    w.line("using System.Collections.Generic;");
    w.line("using UnityEngine;");
    w.blank();
    w.open("namespace GameData");

    for column in snapshot.columns().iter().filter(|c| c.data_type == DataType::Enum) {
        w.open(format!("public enum {}", enum_type_name(&table.name, &column.name)));
        let mut seen = HashSet::new();
        for value in column.enum_values.iter().flatten() {
            let variant = enum_variant_name(value);
            if seen.insert(variant.clone()) {
                w.line(format!("{variant},"));
            }
        }
        w.close();
        w.blank();
    }

    w.line("[Serializable]");
    w.open(format!("public class {row_type}"));
    w.line("public long id;");
    let mut fields = HashSet::from(["id".to_string()]);
    for column in snapshot.columns() {
        let mut field = field_name(&column.name);
        while !fields.insert(field.clone()) {
            field.push('_');
        }
        if let Some(target) = column.reference_table_id {
            let target_name = snapshot
                .referenced_tables
                .get(&target)
                .cloned()
                .unwrap_or_else(|| format!("table {target}"));
            w.line(format!("/// <summary>Row id in {target_name}.</summary>"));
        }
        w.line(format!("public {} {field};", csharp_type(column, &table.name)));
    }
    w.close();
    w.blank();

    w.line(format!(
        "[CreateAssetMenu(fileName = \"{}\", menuName = \"Game Data/{}\")]",
        type_name(&table.name),
        table.name.replace('"', "")
    ));
    w.open(format!("public class {database_type} : ScriptableObject"));
    w.line(format!("public List<{row_type}> items = new List<{row_type}>();"));
    w.blank();
    w.open(format!("public {row_type} GetById(long id)"));
    w.open("foreach (var item in items)");
    w.line("if (item.id == id) return item;");
    w.close();
    w.line("return null;");
    w.close();
    w.close();

    w.close();
    w.out
}

#[derive(Default)]
struct CSharpWriter {
    out: String,
    depth: usize,
}

impl CSharpWriter {
    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn open(&mut self, header: impl AsRef<str>) {
        self.line(header);
        self.line("{");
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }
}
