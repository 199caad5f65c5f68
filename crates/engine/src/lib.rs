//! # Rebind Engine
//!
//! The Rebind Engine evaluates the reactive bindings of a data tree. Entities
//! (widgets, actions, function collections) store property values such as
//! `"{{Table1.selectedRow.name}}"`; a pass replaces every such binding with the
//! value of its expression, evaluating dependencies before their dependents.
//!
//! ## Usage
//!
//! ```rust
//! use rebind_engine::{Interpreter, PassOptions, evaluate_data_tree, load_data_tree_file};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let tree_path = temp_dir.path().join("tree.yaml");
//! std::fs::write(&tree_path, r#"
//! Table1:
//!   type: TABLE_WIDGET
//!   selectedRow: { id: 7 }
//! Input1:
//!   type: INPUT_WIDGET
//!   text: "{{Table1.selectedRow.id}}"
//!   dynamicBindings: { text: true }
//! "#)?;
//!
//! let tree = load_data_tree_file(&tree_path)?;
//! let output = evaluate_data_tree(&tree, &Interpreter::new(), None, PassOptions::default());
//! assert_eq!(output.tree.get_path("Input1.text").as_deref(), Some(&serde_json::json!(7)));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`bindings`**: splits raw strings into literal and `{{ ... }}` segments
//! - **`path_index`**: every addressable path of a tree
//! - **`dependencies`**: dependency edges between bound properties
//! - **`planning`**: evaluation order, or the cycle preventing one
//! - **`expression`**: the expression language and its interpreter
//! - **`evaluate`**: value of a whole binding string
//! - **`validators`**: per-widget property parsing after evaluation
//! - **`orchestrator`**: complete passes and their publication

use std::{fs, path::Path};

use anyhow::{Context, Result};
use rebind_types::DataTree;

pub mod bindings;
pub mod dependencies;
pub mod evaluate;
pub mod expression;
pub mod orchestrator;
pub mod path_index;
pub mod planning;
pub mod validators;

pub use bindings::{DynamicBindings, get_dynamic_bindings, is_dynamic_text, is_dynamic_value, parse_dynamic_string};
pub use dependencies::{calculate_sub_dependencies, create_dependency_graph};
pub use evaluate::{create_dynamic_value_string, evaluate_dynamic_bound_value, get_dynamic_value};
pub use expression::{ExpressionError, ExpressionEvaluator, Interpreter, Scope};
pub use orchestrator::{EvaluatedTree, PassOptions, PassOutput, PassStatus, TreeEvaluator, evaluate_data_tree};
pub use path_index::GlobalPathIndex;
pub use planning::{CycleError, sort_dependencies};
pub use validators::{
    EntityValidation, PropertyValidator, ValidationReport, ValidatorConfig, ValidatorRegistry, apply_validators, enhance_with_validations,
    get_parsed_tree, load_validator_config,
};

/// Loads a data tree document from the filesystem.
///
/// The document is parsed as YAML, which also accepts JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not describe a data
/// tree (for example a non-string `type` tag).
pub fn load_data_tree_file(file_path: impl AsRef<Path>) -> Result<DataTree> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read data tree file: {}", file_path.display()))?;
    if content.trim().is_empty() {
        return Ok(DataTree::new());
    }
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse data tree file: {}", file_path.display()))
}
