//! Evaluation ordering over the dependency graph.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use rebind_types::DependencyGraph;
use thiserror::Error;

/// The graph contains at least one cycle, so no evaluation order exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cyclic dependency detected involving: {}", .paths.join(", "))]
pub struct CycleError {
    /// Paths left unordered when sorting stopped, sorted for stable output.
    pub paths: Vec<String>,
}

/// Orders every path in the graph so that each dependency precedes its dependents.
///
/// Nodes are the union of both edge endpoints. Duplicate edges are ignored,
/// and a self-edge counts as a cycle. Among paths with no ordering constraint
/// between them, the result is deterministic for a given edge list.
pub fn sort_dependencies(graph: &DependencyGraph) -> Result<Vec<String>, CycleError> {
    // Edges point dependent -> dependency; in-degree counts incoming edges.
    let mut in_degrees: IndexMap<&str, usize> = IndexMap::new();
    let mut adjacency: IndexMap<&str, Vec<&str>> = IndexMap::new();
    let mut seen_edges = HashSet::new();

    for edge in graph {
        in_degrees.entry(edge.dependent.as_str()).or_insert(0);
        in_degrees.entry(edge.dependency.as_str()).or_insert(0);
        if !seen_edges.insert((edge.dependent.as_str(), edge.dependency.as_str())) {
            continue;
        }
        *in_degrees.entry(edge.dependency.as_str()).or_insert(0) += 1;
        adjacency.entry(edge.dependent.as_str()).or_default().push(edge.dependency.as_str());
    }

    let mut queue: VecDeque<&str> = in_degrees.iter().filter(|(_, degree)| **degree == 0).map(|(path, _)| *path).collect();

    let mut ordered = Vec::with_capacity(in_degrees.len());
    while let Some(path) = queue.pop_front() {
        ordered.push(path.to_string());

        if let Some(dependencies) = adjacency.get(path) {
            for dependency in dependencies {
                if let Some(degree) = in_degrees.get_mut(dependency) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependency);
                    }
                }
            }
        }
    }

    if ordered.len() != in_degrees.len() {
        let mut paths: Vec<String> = in_degrees
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(path, _)| path.to_string())
            .collect();
        paths.sort();
        return Err(CycleError { paths });
    }

    ordered.reverse();
    Ok(ordered)
}
