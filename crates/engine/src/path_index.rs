//! Index of every addressable path in a data tree.

use std::collections::HashSet;

use rebind_types::{DataTree, TYPE_KEY};
use serde_json::Value;

/// Set of dot paths that exist in a tree.
///
/// Contains every entity name and, recursively, every object key beneath it
/// (`Table1`, `Table1.selectedRow`, `Table1.selectedRow.id`). Arrays are
/// leaves: their own path is indexed but element indices are not. The binding
/// flags of an entity are not part of its addressable content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalPathIndex {
    paths: HashSet<String>,
}

impl GlobalPathIndex {
    pub fn build(tree: &DataTree) -> Self {
        let mut index = Self::default();
        for (name, entity) in tree.iter() {
            index.paths.insert(name.clone());
            if entity.kind.declared_type().is_some() && !entity.properties.contains_key(TYPE_KEY) {
                index.paths.insert(format!("{name}.{TYPE_KEY}"));
            }
            for (key, value) in &entity.properties {
                index.register(format!("{name}.{key}"), value);
            }
        }
        index
    }

    fn register(&mut self, path: String, value: &Value) {
        if let Value::Object(map) = value {
            for (key, child) in map {
                self.register(format!("{path}.{key}"), child);
            }
        }
        self.paths.insert(path);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_indexes_nested_object_keys_but_not_array_elements() {
        let tree: DataTree = serde_json::from_value(json!({
            "Table1": {
                "type": "TABLE_WIDGET",
                "selectedRow": {"id": 1, "meta": {"tag": "x"}},
                "tableData": [{"id": 1}]
            },
            "Input1": {"text": "{{Table1.selectedRow.id}}", "dynamicBindings": {"text": true}}
        }))
        .expect("tree");

        let index = GlobalPathIndex::build(&tree);
        for path in [
            "Table1",
            "Table1.type",
            "Table1.selectedRow",
            "Table1.selectedRow.id",
            "Table1.selectedRow.meta.tag",
            "Table1.tableData",
            "Input1",
            "Input1.text",
        ] {
            assert!(index.contains(path), "missing {path}");
        }
        assert!(!index.contains("Table1.tableData.0"));
        assert!(!index.contains("Input1.dynamicBindings"));
        assert!(!index.contains("Input1.type"));
        assert_eq!(index.len(), 9);
    }

    #[test]
    fn empty_tree_has_empty_index() {
        assert!(GlobalPathIndex::build(&DataTree::new()).is_empty());
    }
}
