//! Dependency discovery for binding-bearing properties.
//!
//! Expressions are never parsed here. Dependencies are found by scanning the
//! expression text for identifier chains and matching each chain against the
//! [`GlobalPathIndex`], keeping the longest prefix that exists in the tree.
//! A chain like `Table1.selectedRow.name` therefore depends on the full path
//! when it exists, or on `Table1.selectedRow` when only that much does.

use once_cell::sync::Lazy;
use rebind_types::{DataTree, DependencyGraph};
use rebind_util::split_path;
use regex::Regex;
use tracing::trace;

use crate::bindings::get_dynamic_bindings;
use crate::path_index::GlobalPathIndex;

static IDENTIFIER_CHAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z_$][a-zA-Z_$0-9.]*").expect("identifier chain regex compiles"));
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z_$][a-zA-Z_$0-9]*").expect("identifier regex compiles"));

/// Builds the dependency edge list for every flagged property of the tree.
///
/// Each edge reads `dependent -> dependency`, where `dependent` is the
/// `entity.property` path of a flagged property. Flagged properties whose
/// value is not a string, or whose bindings reference nothing in the tree,
/// contribute no edges.
pub fn create_dependency_graph(tree: &DataTree) -> DependencyGraph {
    let index = GlobalPathIndex::build(tree);
    create_dependency_graph_with_index(tree, &index)
}

/// Same as [`create_dependency_graph`] with a prebuilt path index.
pub fn create_dependency_graph_with_index(tree: &DataTree, index: &GlobalPathIndex) -> DependencyGraph {
    let mut graph = DependencyGraph::new();

    for (name, entity) in tree.iter() {
        for property in &entity.dynamic_bindings {
            let dependent = format!("{name}.{property}");
            let Some(raw) = entity.get(&split_path(property)) else {
                continue;
            };
            let Some(text) = raw.as_str() else {
                continue;
            };

            for expression in get_dynamic_bindings(text).expressions() {
                for dependency in calculate_sub_dependencies(expression, index) {
                    trace!(dependent = %dependent, dependency = %dependency, "dependency edge");
                    graph.push(dependent.clone(), dependency);
                }
            }
        }
    }

    graph
}

/// Resolves the tree paths an expression reads.
///
/// Every identifier chain in the text is taken verbatim when the index holds
/// it. Otherwise its dot-separated identifiers are accumulated left to right
/// while the growing prefix stays in the index, and the longest such prefix
/// is kept. Chains with no indexed prefix are dropped, which silently
/// discards literal words and unknown globals. When the text contains no
/// identifier at all, the whole text is tried as a path.
pub fn calculate_sub_dependencies(expression: &str, index: &GlobalPathIndex) -> Vec<String> {
    let mut chains: Vec<&str> = IDENTIFIER_CHAIN.find_iter(expression).map(|found| found.as_str()).collect();
    if chains.is_empty() {
        chains.push(expression);
    }

    let mut dependencies = Vec::new();
    for chain in chains {
        if index.contains(chain) {
            dependencies.push(chain.to_string());
            continue;
        }

        let mut current = String::new();
        for identifier in IDENTIFIER.find_iter(chain) {
            let candidate = if current.is_empty() {
                identifier.as_str().to_string()
            } else {
                format!("{current}.{}", identifier.as_str())
            };
            if !index.contains(&candidate) {
                break;
            }
            current = candidate;
        }
        if !current.is_empty() {
            dependencies.push(current);
        }
    }
    dependencies
}
