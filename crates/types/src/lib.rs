//! Shared type definitions for the reactive binding evaluator.
//!
//! - [`tree`]: entities and the data tree they live in
//! - [`graph`]: dependency edges between property paths
//! - [`validation`]: per-property validation rules and their outcomes

pub mod graph;
pub mod tree;
pub mod validation;

pub use graph::{DependencyEdge, DependencyGraph};
pub use tree::{DYNAMIC_BINDINGS_KEY, DataTree, Entity, EntityKind, TYPE_KEY, TreeError};
pub use validation::{ValidationOutcome, ValidationRule, ValidationType, validate_value};
