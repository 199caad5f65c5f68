//! # Path Processing Utilities
//!
//! Helpers for the two kinds of paths the evaluator deals with: filesystem
//! paths for configuration documents, and dot-delimited paths addressing a
//! location inside a JSON value (`selectedRow.name`, `tableData[0].id`).

use std::path::PathBuf;

use dirs_next::home_dir;
use serde_json::{Map, Value};

pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Splits a property path into its segments.
///
/// Dots separate segments and bracketed indices become their own segment, so
/// `items[0].name` yields `["items", "0", "name"]`. Empty segments are dropped.
///
/// # Example
/// ```rust
/// use rebind_util::path_processing::split_path;
///
/// assert_eq!(split_path("Table1.selectedRow.id"), vec!["Table1", "selectedRow", "id"]);
/// assert_eq!(split_path("tableData[1].name"), vec!["tableData", "1", "name"]);
/// ```
pub fn split_path(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut remainder = part;
        while let Some(open) = remainder.find('[') {
            let key = &remainder[..open];
            if !key.is_empty() {
                segments.push(key);
            }
            let after_open = &remainder[open + 1..];
            match after_open.find(']') {
                Some(close) => {
                    let index = after_open[..close].trim();
                    if !index.is_empty() {
                        segments.push(index);
                    }
                    remainder = &after_open[close + 1..];
                }
                None => {
                    remainder = after_open;
                    break;
                }
            }
        }
        if !remainder.is_empty() {
            segments.push(remainder);
        }
    }
    segments
}

/// Reads the value addressed by `segments` inside `value`.
///
/// Object segments are looked up by key and array segments must parse as an
/// index. Returns `None` when any segment is missing or applied to a scalar.
pub fn get_json_path<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Reads the value addressed by `segments` inside an object map.
pub fn get_map_path<'a>(map: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    get_json_path(map.get(*first)?, rest)
}

/// Writes `new_value` at `segments` inside an object map.
///
/// Missing intermediate containers are created as objects, and scalars that
/// sit where a container is needed are replaced. Numeric segments applied to an
/// array assign by index, padding with `null` when the index is past the end.
/// An empty `segments` slice leaves the map untouched.
pub fn set_map_path(map: &mut Map<String, Value>, segments: &[&str], new_value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert((*first).to_string(), new_value);
        return;
    }
    let slot = map.entry((*first).to_string()).or_insert(Value::Null);
    set_json_path(slot, rest, new_value);
}

/// Removes the value at `segments` inside `map`, returning it.
///
/// Array elements are not removed; their slot is reset to `null`.
pub fn remove_map_path(map: &mut Map<String, Value>, segments: &[&str]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    let Some((first, inner)) = parents.split_first() else {
        return map.remove(*last);
    };
    let mut current = map.get_mut(*first)?;
    for segment in inner {
        current = match current {
            Value::Object(children) => children.get_mut(*segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Object(children) => children.remove(*last),
        Value::Array(items) => items.get_mut(last.parse::<usize>().ok()?).map(Value::take),
        _ => None,
    }
}

fn set_json_path(target: &mut Value, segments: &[&str], new_value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = new_value;
        return;
    };

    if let Value::Array(items) = target
        && let Ok(index) = first.parse::<usize>()
    {
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        set_json_path(&mut items[index], rest, new_value);
        return;
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let slot = map.entry((*first).to_string()).or_insert(Value::Null);
        set_json_path(slot, rest, new_value);
    }
}
