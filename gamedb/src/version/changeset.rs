use crate::row::{CellValue, Row};
use crate::schema::Column;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of schema-level entity a change entry can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaEntity {
    Column,
    Row,
}

/// Identifies what a change entry touched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKey {
    Cell { row_id: i64, column: String },
    Schema { entity: SchemaEntity, entity_id: i64 },
}

impl ChangeKey {
    pub fn cell(row_id: i64, column: impl Into<String>) -> Self {
        ChangeKey::Cell {
            row_id,
            column: column.into(),
        }
    }

    pub fn column(column_id: i64) -> Self {
        ChangeKey::Schema {
            entity: SchemaEntity::Column,
            entity_id: column_id,
        }
    }

    pub fn row(row_id: i64) -> Self {
        ChangeKey::Schema {
            entity: SchemaEntity::Row,
            entity_id: row_id,
        }
    }
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKey::Cell { row_id, column } => write!(f, "row {row_id}.{column}"),
            ChangeKey::Schema {
                entity: SchemaEntity::Column,
                entity_id,
            } => write!(f, "column {entity_id}"),
            ChangeKey::Schema {
                entity: SchemaEntity::Row,
                entity_id,
            } => write!(f, "row {entity_id}"),
        }
    }
}

/// A recorded value. Snapshots are copies, never live pointers, so a commit
/// stays readable after the entity it mentions is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ChangeValue {
    Cell(CellValue),
    Column(Column),
    Row(Row),
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub old_value: ChangeValue,
    pub new_value: ChangeValue,
}

impl Change {
    pub fn new(old_value: ChangeValue, new_value: ChangeValue) -> Self {
        Change {
            old_value,
            new_value,
        }
    }

    pub fn inverse(&self) -> Change {
        Change {
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
        }
    }
}

/// One entry of a change set. The serialized form of a change set is a list
/// of these, which keeps keys structured instead of flattening them into
/// strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub key: ChangeKey,
    pub old_value: ChangeValue,
    pub new_value: ChangeValue,
}

/// Mapping from changed entity to its old and new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChangeEntry>", into = "Vec<ChangeEntry>")]
pub struct ChangeSet {
    entries: BTreeMap<ChangeKey, Change>,
}

/// A serialized change set listed the same key twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateChangeKey(pub ChangeKey);

impl fmt::Display for DuplicateChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "change set lists {} more than once", self.0)
    }
}

impl TryFrom<Vec<ChangeEntry>> for ChangeSet {
    type Error = DuplicateChangeKey;

    fn try_from(list: Vec<ChangeEntry>) -> Result<Self, Self::Error> {
        let mut entries = BTreeMap::new();
        for entry in list {
            if entries.contains_key(&entry.key) {
                return Err(DuplicateChangeKey(entry.key));
            }
            entries.insert(entry.key, Change::new(entry.old_value, entry.new_value));
        }
        Ok(ChangeSet { entries })
    }
}

impl From<ChangeSet> for Vec<ChangeEntry> {
    fn from(set: ChangeSet) -> Self {
        set.entries
            .into_iter()
            .map(|(key, change)| ChangeEntry {
                key,
                old_value: change.old_value,
                new_value: change.new_value,
            })
            .collect()
    }
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ChangeKey, change: Change) {
        self.entries.insert(key, change);
    }

    pub fn record_cell(&mut self, row_id: i64, column: &str, old: CellValue, new: CellValue) {
        self.insert(
            ChangeKey::cell(row_id, column),
            Change::new(ChangeValue::Cell(old), ChangeValue::Cell(new)),
        );
    }

    pub fn get(&self, key: &ChangeKey) -> Option<&Change> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChangeKey, &Change)> {
        self.entries.iter()
    }

    /// Merge another change set into this one; later entries win.
    pub fn extend(&mut self, other: ChangeSet) {
        self.entries.extend(other.entries);
    }

    /// Same keys with old and new swapped.
    pub fn inverse(&self) -> ChangeSet {
        ChangeSet {
            entries: self
                .entries
                .iter()
                .map(|(k, c)| (k.clone(), c.inverse()))
                .collect(),
        }
    }

    /// Cell-level delta between two snapshots of the same table. Rows present
    /// on one side only become row entries.
    pub fn between(before: &[Row], after: &[Row]) -> ChangeSet {
        let old_rows: BTreeMap<i64, &Row> = before.iter().map(|r| (r.id, r)).collect();
        let new_rows: BTreeMap<i64, &Row> = after.iter().map(|r| (r.id, r)).collect();
        let mut set = ChangeSet::new();

        for (id, old_row) in &old_rows {
            match new_rows.get(id) {
                Some(new_row) => {
                    let names: BTreeSet<&String> =
                        old_row.cells.keys().chain(new_row.cells.keys()).collect();
                    for name in names {
                        let old = old_row.get(name);
                        let new = new_row.get(name);
                        if old != new {
                            set.record_cell(*id, name, old.clone(), new.clone());
                        }
                    }
                }
                None => set.insert(
                    ChangeKey::row(*id),
                    Change::new(ChangeValue::Row((*old_row).clone()), ChangeValue::Absent),
                ),
            }
        }

        for (id, new_row) in &new_rows {
            if !old_rows.contains_key(id) {
                set.insert(
                    ChangeKey::row(*id),
                    Change::new(ChangeValue::Absent, ChangeValue::Row((*new_row).clone())),
                );
            }
        }

        set
    }
}

impl IntoIterator for ChangeSet {
    type Item = (ChangeKey, Change);
    type IntoIter = std::collections::btree_map::IntoIter<ChangeKey, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(ChangeKey, Change)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (ChangeKey, Change)>>(iter: I) -> Self {
        ChangeSet {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Cells;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn row(id: i64, cells: &[(&str, CellValue)]) -> Row {
        let now = Utc::now();
        Row {
            id,
            table_id: 1,
            cells: cells
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<Cells>(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_inverse_swaps_values() {
        let mut set = ChangeSet::new();
        set.record_cell(
            1,
            "rarity",
            CellValue::EnumValue("rare".into()),
            CellValue::EnumValue("epic".into()),
        );

        let inverse = set.inverse();
        let change = inverse.get(&ChangeKey::cell(1, "rarity")).unwrap();
        assert_eq!(change.old_value, ChangeValue::Cell(CellValue::EnumValue("epic".into())));
        assert_eq!(change.new_value, ChangeValue::Cell(CellValue::EnumValue("rare".into())));
        assert_eq!(inverse.inverse(), set);
    }

    #[test]
    fn test_serialized_as_entry_list() {
        let mut set = ChangeSet::new();
        set.record_cell(4, "name", CellValue::Null, CellValue::String("Bow".into()));

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "key": { "kind": "cell", "row_id": 4, "column": "name" },
                "old_value": { "kind": "cell", "value": { "type": "null" } },
                "new_value": { "kind": "cell", "value": { "type": "string", "value": "Bow" } }
            }])
        );

        let back: ChangeSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let entry = serde_json::json!({
            "key": { "kind": "cell", "row_id": 4, "column": "name" },
            "old_value": { "kind": "cell", "value": { "type": "null" } },
            "new_value": { "kind": "cell", "value": { "type": "string", "value": "Bow" } }
        });
        let mut other = entry.clone();
        other["new_value"]["value"]["value"] = serde_json::json!("Axe");

        let err = serde_json::from_value::<ChangeSet>(serde_json::json!([entry, other])).unwrap_err();
        assert!(err.to_string().contains("row 4.name more than once"), "{err}");
    }

    #[test]
    fn test_between_snapshots() {
        let before = vec![
            row(1, &[("name", CellValue::String("Sword".into())), ("level", CellValue::Integer(1))]),
            row(2, &[("name", CellValue::String("Shield".into()))]),
        ];
        let after = vec![
            row(1, &[("name", CellValue::String("Sword".into())), ("level", CellValue::Integer(2))]),
            row(3, &[("name", CellValue::String("Bow".into()))]),
        ];

        let set = ChangeSet::between(&before, &after);
        assert_eq!(set.len(), 3);

        let level = set.get(&ChangeKey::cell(1, "level")).unwrap();
        assert_eq!(level.old_value, ChangeValue::Cell(CellValue::Integer(1)));
        assert_eq!(level.new_value, ChangeValue::Cell(CellValue::Integer(2)));

        let removed = set.get(&ChangeKey::row(2)).unwrap();
        assert_eq!(removed.new_value, ChangeValue::Absent);

        let added = set.get(&ChangeKey::row(3)).unwrap();
        assert_eq!(added.old_value, ChangeValue::Absent);
    }

    #[test]
    fn test_between_identical_is_empty() {
        let rows = vec![row(1, &[("name", CellValue::String("Sword".into()))])];
        assert!(ChangeSet::between(&rows, &rows).is_empty());
    }
}
