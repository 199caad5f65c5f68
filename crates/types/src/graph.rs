//! Dependency edges produced by the graph builder.

use serde::{Deserialize, Serialize};

/// `dependent` reads `dependency`; the dependency must be evaluated first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Path of the binding-bearing property, e.g. `Input1.text`.
    pub dependent: String,
    /// Path the binding reads, e.g. `Table1.selectedRow`.
    pub dependency: String,
}

impl DependencyEdge {
    pub fn new(dependent: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self {
            dependent: dependent.into(),
            dependency: dependency.into(),
        }
    }
}

/// Edge list for one evaluation pass. Duplicate edges are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    pub edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dependent: impl Into<String>, dependency: impl Into<String>) {
        self.edges.push(DependencyEdge::new(dependent, dependency));
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DependencyEdge> {
        self.edges.iter()
    }

    /// Distinct dependency paths of `dependent`, in edge order.
    pub fn dependencies_of<'a>(&'a self, dependent: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let mut seen = std::collections::HashSet::new();
        self.edges
            .iter()
            .filter(move |edge| edge.dependent == dependent)
            .map(|edge| edge.dependency.as_str())
            .filter(move |dependency| seen.insert(*dependency))
    }

    /// Distinct dependent paths, in edge order.
    pub fn dependents(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.edges
            .iter()
            .map(|edge| edge.dependent.as_str())
            .filter(|dependent| seen.insert(*dependent))
            .collect()
    }
}

impl FromIterator<DependencyEdge> for DependencyGraph {
    fn from_iter<T: IntoIterator<Item = DependencyEdge>>(iter: T) -> Self {
        Self {
            edges: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a DependencyGraph {
    type Item = &'a DependencyEdge;
    type IntoIter = std::slice::Iter<'a, DependencyEdge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}
