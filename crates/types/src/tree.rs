//! Entity and data tree definitions.
//!
//! A [`DataTree`] maps entity names (`Table1`, `Input1`, `fetchUsers`) to
//! [`Entity`] nodes. Each entity carries a declared type tag, an open property
//! map and the set of property paths whose values are binding strings. The
//! persisted form is the flat JSON object the application stores:
//!
//! ```json
//! {
//!   "Input1": {
//!     "type": "INPUT_WIDGET",
//!     "text": "{{Table1.selectedRow.name}}",
//!     "dynamicBindings": { "text": true }
//!   }
//! }
//! ```

use std::borrow::Cow;
use std::collections::BTreeSet;

use indexmap::IndexMap;
use rebind_util::{get_json_path, get_map_path, remove_map_path, set_map_path, split_path};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Key holding the entity type tag in the persisted form.
pub const TYPE_KEY: &str = "type";
/// Key holding the flagged property paths in the persisted form.
pub const DYNAMIC_BINDINGS_KEY: &str = "dynamicBindings";

const ACTION_TYPE: &str = "ACTION";
const JS_OBJECT_TYPE: &str = "JS_OBJECT";

/// Errors raised while converting or addressing tree content.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("entity type tag must be a string, found {found}")]
    InvalidTypeTag { found: String },

    #[error("dynamicBindings must be an object of booleans or an array of strings")]
    InvalidDynamicBindings,

    #[error("unknown entity '{name}'")]
    UnknownEntity { name: String },

    #[error("path '{path}' does not address a property")]
    NotAProperty { path: String },

    #[error("the type tag of '{name}' cannot be overwritten by evaluation")]
    TypeTagNotWritable { name: String },
}

/// Declared kind of an entity, derived from its `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EntityKind {
    /// A UI component; `widget_type` is the raw tag such as `INPUT_WIDGET`.
    Widget { widget_type: String },
    /// A data source call such as an API or query.
    Action,
    /// A user-defined function collection.
    JsObject,
    /// An entity persisted without a `type` tag.
    #[default]
    Untyped,
}

impl EntityKind {
    /// Maps a raw `type` tag onto an entity kind.
    pub fn from_type_tag(tag: Option<&str>) -> Self {
        match tag {
            None => EntityKind::Untyped,
            Some(ACTION_TYPE) => EntityKind::Action,
            Some(JS_OBJECT_TYPE) => EntityKind::JsObject,
            Some(widget_type) => EntityKind::Widget {
                widget_type: widget_type.to_string(),
            },
        }
    }

    /// Returns the raw `type` tag, used as the validator lookup key.
    pub fn declared_type(&self) -> Option<&str> {
        match self {
            EntityKind::Widget { widget_type } => Some(widget_type.as_str()),
            EntityKind::Action => Some(ACTION_TYPE),
            EntityKind::JsObject => Some(JS_OBJECT_TYPE),
            EntityKind::Untyped => None,
        }
    }
}

/// A named node of the reactive tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Entity {
    /// Declared kind of the entity.
    pub kind: EntityKind,
    /// Open property map; values are arbitrary JSON.
    pub properties: Map<String, Value>,
    /// Property paths (relative to the entity) that hold binding strings.
    pub dynamic_bindings: BTreeSet<String>,
}

impl Entity {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Builder-style helper used by tests and callers assembling trees in code.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Sets a property and flags it as binding-bearing.
    pub fn with_binding(mut self, key: impl Into<String>, raw: impl Into<String>) -> Self {
        let key = key.into();
        self.properties.insert(key.clone(), Value::String(raw.into()));
        self.dynamic_bindings.insert(key);
        self
    }

    /// The JSON value expressions see when they reference this entity.
    ///
    /// Contains every property plus the `type` tag. The binding flags are not
    /// part of it.
    pub fn scope_value(&self) -> Value {
        let mut map = self.properties.clone();
        if let Some(tag) = self.kind.declared_type() {
            map.insert(TYPE_KEY.to_string(), Value::String(tag.to_string()));
        }
        Value::Object(map)
    }

    /// Reads a value by property path segments.
    pub fn get(&self, segments: &[&str]) -> Option<Cow<'_, Value>> {
        match segments.split_first() {
            None => Some(Cow::Owned(self.scope_value())),
            Some((&TYPE_KEY, rest)) if !self.properties.contains_key(TYPE_KEY) => {
                let tag = Value::String(self.kind.declared_type()?.to_string());
                get_json_path(&tag, rest).cloned().map(Cow::Owned)
            }
            Some(_) => get_map_path(&self.properties, segments).map(Cow::Borrowed),
        }
    }
}

impl TryFrom<Map<String, Value>> for Entity {
    type Error = TreeError;

    fn try_from(mut properties: Map<String, Value>) -> Result<Self, Self::Error> {
        let kind = match properties.remove(TYPE_KEY) {
            None | Some(Value::Null) => EntityKind::Untyped,
            Some(Value::String(tag)) => EntityKind::from_type_tag(Some(tag.as_str())),
            Some(other) => {
                return Err(TreeError::InvalidTypeTag {
                    found: other.to_string(),
                });
            }
        };

        let dynamic_bindings = match properties.remove(DYNAMIC_BINDINGS_KEY) {
            None | Some(Value::Null) => BTreeSet::new(),
            Some(Value::Object(flags)) => {
                let mut bindings = BTreeSet::new();
                for (path, flag) in flags {
                    match flag {
                        Value::Bool(true) => {
                            bindings.insert(path);
                        }
                        Value::Bool(false) => {}
                        _ => return Err(TreeError::InvalidDynamicBindings),
                    }
                }
                bindings
            }
            Some(Value::Array(paths)) => paths
                .into_iter()
                .map(|path| match path {
                    Value::String(path) => Ok(path),
                    _ => Err(TreeError::InvalidDynamicBindings),
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(TreeError::InvalidDynamicBindings),
        };

        Ok(Self {
            kind,
            properties,
            dynamic_bindings,
        })
    }
}

impl From<Entity> for Map<String, Value> {
    fn from(entity: Entity) -> Self {
        let mut map = Map::new();
        if let Some(tag) = entity.kind.declared_type() {
            map.insert(TYPE_KEY.to_string(), Value::String(tag.to_string()));
        }
        map.extend(entity.properties);
        if !entity.dynamic_bindings.is_empty() {
            let flags = entity
                .dynamic_bindings
                .into_iter()
                .map(|path| (path, Value::Bool(true)))
                .collect::<Map<_, _>>();
            map.insert(DYNAMIC_BINDINGS_KEY.to_string(), Value::Object(flags));
        }
        map
    }
}

/// Mapping from entity name to entity, in insertion order.
///
/// Insertion order carries no meaning for evaluation but keeps every pass and
/// every serialized tree deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataTree {
    entities: IndexMap<String, Entity>,
}

impl DataTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entity, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, entity: Entity) -> Option<Entity> {
        self.entities.insert(name.into(), entity)
    }

    /// Builder-style insert.
    pub fn with_entity(mut self, name: impl Into<String>, entity: Entity) -> Self {
        self.insert(name, entity);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        self.entities.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entity)> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Entity)> {
        self.entities.iter_mut()
    }

    /// Reads the value at a dot path such as `Table1.selectedRow.id`.
    ///
    /// A bare entity name yields the entity's scope value.
    pub fn get_path(&self, path: &str) -> Option<Cow<'_, Value>> {
        let segments = split_path(path);
        let (name, rest) = segments.split_first()?;
        self.entities.get(*name)?.get(rest)
    }

    /// Writes a value at a dot path, creating intermediate objects as needed.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), TreeError> {
        let segments = split_path(path);
        let Some((name, rest)) = segments.split_first() else {
            return Err(TreeError::NotAProperty { path: path.to_string() });
        };
        let entity = self
            .entities
            .get_mut(*name)
            .ok_or_else(|| TreeError::UnknownEntity { name: name.to_string() })?;
        if rest.is_empty() {
            return Err(TreeError::NotAProperty { path: path.to_string() });
        }
        if rest[0] == TYPE_KEY && !entity.properties.contains_key(TYPE_KEY) && entity.kind != EntityKind::Untyped {
            return Err(TreeError::TypeTagNotWritable { name: name.to_string() });
        }
        set_map_path(&mut entity.properties, rest, value);
        Ok(())
    }

    /// Removes the value at a dot path; array slots are reset to `null`.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        let segments = split_path(path);
        let (name, rest) = segments.split_first()?;
        remove_map_path(&mut self.entities.get_mut(*name)?.properties, rest)
    }

    /// Serializes the whole tree into its persisted JSON form.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entities
                .iter()
                .map(|(name, entity)| (name.clone(), Value::Object(entity.clone().into())))
                .collect(),
        )
    }
}

impl FromIterator<(String, Entity)> for DataTree {
    fn from_iter<T: IntoIterator<Item = (String, Entity)>>(iter: T) -> Self {
        Self {
            entities: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> DataTree {
        serde_json::from_value(json!({
            "Table1": {
                "type": "TABLE_WIDGET",
                "selectedRow": {"id": 7, "name": "Ada"},
                "tableData": [{"id": 7}]
            },
            "Input1": {
                "type": "INPUT_WIDGET",
                "text": "{{Table1.selectedRow.name}}",
                "dynamicBindings": {"text": true, "label": false}
            },
            "fetchUsers": {
                "type": "ACTION",
                "data": null,
                "dynamicBindings": ["config.url"]
            }
        }))
        .expect("tree deserializes")
    }

    #[test]
    fn deserializes_flat_entities() {
        let tree = sample_tree();
        let input = tree.get("Input1").expect("input");
        assert_eq!(
            input.kind,
            EntityKind::Widget {
                widget_type: "INPUT_WIDGET".into()
            }
        );
        assert_eq!(input.dynamic_bindings.iter().collect::<Vec<_>>(), vec!["text"]);
        assert!(!input.properties.contains_key(TYPE_KEY));
        assert!(!input.properties.contains_key(DYNAMIC_BINDINGS_KEY));

        let action = tree.get("fetchUsers").expect("action");
        assert_eq!(action.kind, EntityKind::Action);
        assert!(action.dynamic_bindings.contains("config.url"));
    }

    #[test]
    fn rejects_malformed_entities() {
        let bad_type = serde_json::from_value::<Entity>(json!({"type": 3}));
        assert!(bad_type.is_err());
        let bad_flags = serde_json::from_value::<Entity>(json!({"dynamicBindings": "text"}));
        assert!(bad_flags.is_err());
    }

    #[test]
    fn serializes_back_to_persisted_form() {
        let tree = sample_tree();
        let value = tree.to_value();
        assert_eq!(value["Input1"]["type"], json!("INPUT_WIDGET"));
        assert_eq!(value["Input1"]["dynamicBindings"], json!({"text": true}));
        assert_eq!(value["fetchUsers"]["dynamicBindings"], json!({"config.url": true}));
        assert!(value["Table1"].get(DYNAMIC_BINDINGS_KEY).is_none());

        let round_tripped: DataTree = serde_json::from_value(value).expect("round trip");
        assert_eq!(round_tripped, tree);
    }

    #[test]
    fn get_path_reads_properties_and_type_tag() {
        let tree = sample_tree();
        assert_eq!(tree.get_path("Table1.selectedRow.id").as_deref(), Some(&json!(7)));
        assert_eq!(tree.get_path("Table1.tableData[0].id").as_deref(), Some(&json!(7)));
        assert_eq!(tree.get_path("Table1.type").as_deref(), Some(&json!("TABLE_WIDGET")));
        assert_eq!(tree.get_path("Table1.missing"), None);
        assert_eq!(tree.get_path("Nope.value"), None);
        assert_eq!(tree.get_path("Table1").expect("entity")["type"], json!("TABLE_WIDGET"));
    }

    #[test]
    fn set_path_writes_nested_values() {
        let mut tree = sample_tree();
        tree.set_path("Input1.style.color", json!("red")).expect("set");
        assert_eq!(tree.get_path("Input1.style.color").as_deref(), Some(&json!("red")));

        assert_eq!(
            tree.set_path("Missing.value", json!(1)),
            Err(TreeError::UnknownEntity { name: "Missing".into() })
        );
        assert_eq!(
            tree.set_path("Input1", json!(1)),
            Err(TreeError::NotAProperty { path: "Input1".into() })
        );
        assert_eq!(
            tree.set_path("Input1.type", json!("X")),
            Err(TreeError::TypeTagNotWritable { name: "Input1".into() })
        );
    }

    #[test]
    fn remove_path_drops_properties() {
        let mut tree = sample_tree();
        assert_eq!(tree.remove_path("Table1.selectedRow.name"), Some(json!("Ada")));
        assert_eq!(tree.get_path("Table1.selectedRow").as_deref(), Some(&json!({"id": 7})));
        assert_eq!(tree.remove_path("Table1"), None);
        assert_eq!(tree.remove_path("Missing.value"), None);
    }

    #[test]
    fn scope_value_includes_type_but_not_flags() {
        let tree = sample_tree();
        let scope = tree.get("Input1").expect("input").scope_value();
        assert_eq!(scope["type"], json!("INPUT_WIDGET"));
        assert!(scope.get(DYNAMIC_BINDINGS_KEY).is_none());
    }
}
