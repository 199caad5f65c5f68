//! Evaluation passes over a data tree.
//!
//! A pass deep-clones the input tree, orders every bound path so that
//! dependencies are evaluated before their dependents, and rewrites each
//! binding string in the private copy with its value. Later paths read the
//! values written by earlier ones. The input tree is never touched and the
//! copy is only handed out once the pass has finished.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rebind_types::DataTree;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bindings::is_dynamic_value;
use crate::dependencies::create_dependency_graph;
use crate::evaluate::get_dynamic_value;
use crate::expression::ExpressionEvaluator;
use crate::planning::sort_dependencies;
use crate::validators::{ValidationReport, ValidatorRegistry, apply_validators};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOptions {
    /// Run the validator registry over the evaluated tree.
    pub parse_values: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    /// No order exists; the tree was returned unevaluated.
    CycleDetected { paths: Vec<String> },
}

/// Result of one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassOutput {
    pub status: PassStatus,
    pub tree: DataTree,
    /// Error text per path whose binding failed; those paths hold `null`.
    pub errors: BTreeMap<String, String>,
    pub validation: ValidationReport,
    /// Paths whose binding was evaluated, in evaluation order.
    pub evaluated: Vec<String>,
}

/// A published pass result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedTree {
    /// Increases by one with every published pass; `0` before the first.
    pub generation: u64,
    pub status: PassStatus,
    pub tree: DataTree,
    pub errors: BTreeMap<String, String>,
    pub validation: ValidationReport,
}

impl EvaluatedTree {
    fn empty() -> Self {
        Self {
            generation: 0,
            status: PassStatus::Completed,
            tree: DataTree::new(),
            errors: BTreeMap::new(),
            validation: ValidationReport::new(),
        }
    }

    fn from_output(generation: u64, output: PassOutput) -> Self {
        Self {
            generation,
            status: output.status,
            tree: output.tree,
            errors: output.errors,
            validation: output.validation,
        }
    }
}

/// Runs one complete evaluation pass over a private copy of `tree`.
///
/// A cycle in the dependency graph aborts the pass before any binding is
/// evaluated: the unmodified copy is returned with
/// [`PassStatus::CycleDetected`], still parsed when `parse_values` is set. A binding that fails to evaluate leaves
/// `null` at its path and the pass continues.
pub fn evaluate_data_tree(
    tree: &DataTree,
    evaluator: &dyn ExpressionEvaluator,
    validators: Option<&ValidatorRegistry>,
    options: PassOptions,
) -> PassOutput {
    let mut working = tree.clone();
    let graph = create_dependency_graph(&working);
    debug!(edges = graph.len(), entities = working.len(), "dependency graph built");

    let order = match sort_dependencies(&graph) {
        Ok(order) => order,
        Err(cycle) => {
            warn!(paths = ?cycle.paths, "cyclic dependency detected; skipping evaluation for this pass");
            let validation = parse_values(&mut working, validators, options);
            return PassOutput {
                status: PassStatus::CycleDetected { paths: cycle.paths },
                tree: working,
                errors: BTreeMap::new(),
                validation,
                evaluated: Vec::new(),
            };
        }
    };

    let mut errors = BTreeMap::new();
    let mut evaluated = Vec::new();
    for path in &order {
        evaluate_path(&mut working, evaluator, path, &mut errors, &mut evaluated);
    }

    // Flagged properties that reference nothing in the tree have no edges.
    let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
    let isolated: Vec<String> = working
        .iter()
        .flat_map(|(name, entity)| entity.dynamic_bindings.iter().map(move |property| format!("{name}.{property}")))
        .filter(|path| !ordered.contains(path.as_str()))
        .collect();
    for path in &isolated {
        evaluate_path(&mut working, evaluator, path, &mut errors, &mut evaluated);
    }

    let validation = parse_values(&mut working, validators, options);

    info!(
        evaluated = evaluated.len(),
        failed = errors.len(),
        validated_entities = validation.len(),
        "evaluation pass finished"
    );

    PassOutput {
        status: PassStatus::Completed,
        tree: working,
        errors,
        validation,
        evaluated,
    }
}

fn parse_values(tree: &mut DataTree, validators: Option<&ValidatorRegistry>, options: PassOptions) -> ValidationReport {
    match validators {
        Some(registry) if options.parse_values => apply_validators(tree, registry),
        _ => ValidationReport::new(),
    }
}

fn evaluate_path(
    working: &mut DataTree,
    evaluator: &dyn ExpressionEvaluator,
    path: &str,
    errors: &mut BTreeMap<String, String>,
    evaluated: &mut Vec<String>,
) {
    let raw = match working.get_path(path) {
        Some(value) if is_dynamic_value(&value) => value.as_str().map(str::to_string),
        _ => None,
    };
    let Some(raw) = raw else {
        return;
    };

    let result = get_dynamic_value(evaluator, &*working, &raw);
    evaluated.push(path.to_string());
    let written = match result {
        Ok(Some(value)) => {
            debug!(path = %path, "binding evaluated");
            working.set_path(path, value)
        }
        Ok(None) => {
            debug!(path = %path, "binding evaluated to undefined");
            working.remove_path(path);
            Ok(())
        }
        Err(error) => {
            warn!(path = %path, error = %error, "binding evaluation failed");
            errors.insert(path.to_string(), error.to_string());
            working.set_path(path, Value::Null)
        }
    };
    if let Err(error) = written {
        warn!(path = %path, error = %error, "could not store evaluated value");
        errors.insert(path.to_string(), error.to_string());
    }
}

/// Runs passes one at a time and publishes each finished tree.
///
/// `run_pass` takes `&mut self`, so passes cannot overlap. Readers hold an
/// `Arc` to the last published tree and never see a pass in progress.
pub struct TreeEvaluator {
    evaluator: Box<dyn ExpressionEvaluator>,
    validators: Option<ValidatorRegistry>,
    options: PassOptions,
    generation: u64,
    published: Arc<EvaluatedTree>,
}

impl TreeEvaluator {
    pub fn new(evaluator: impl ExpressionEvaluator + 'static) -> Self {
        Self {
            evaluator: Box::new(evaluator),
            validators: None,
            options: PassOptions::default(),
            generation: 0,
            published: Arc::new(EvaluatedTree::empty()),
        }
    }

    /// Enables the parsing pass with the given validators.
    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = Some(validators);
        self.options.parse_values = true;
        self
    }

    pub fn with_options(mut self, options: PassOptions) -> Self {
        self.options = options;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Evaluates `tree`, publishes the result and returns it.
    pub fn run_pass(&mut self, tree: &DataTree) -> Arc<EvaluatedTree> {
        let output = evaluate_data_tree(tree, self.evaluator.as_ref(), self.validators.as_ref(), self.options);
        self.generation += 1;
        debug!(generation = self.generation, "publishing evaluated tree");
        self.published = Arc::new(EvaluatedTree::from_output(self.generation, output));
        Arc::clone(&self.published)
    }

    /// The last published tree.
    pub fn published(&self) -> Arc<EvaluatedTree> {
        Arc::clone(&self.published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{ExpressionError, Interpreter, Scope};
    use rebind_types::ValidationType;
    use serde_json::json;

    fn tree(value: Value) -> DataTree {
        serde_json::from_value(value).expect("tree")
    }

    fn run(input: &DataTree) -> PassOutput {
        evaluate_data_tree(input, &Interpreter::new(), None, PassOptions::default())
    }

    #[test]
    fn chained_bindings_resolve_in_dependency_order() {
        let input = tree(json!({
            "Input1": {"type": "INPUT_WIDGET", "text": "{{Select1.value}}", "dynamicBindings": {"text": true}},
            "Select1": {"type": "SELECT_WIDGET", "value": "{{Table1.selectedRow.id}}", "dynamicBindings": {"value": true}},
            "Table1": {"type": "TABLE_WIDGET", "selectedRow": {"id": 7}}
        }));

        let output = run(&input);
        assert_eq!(output.status, PassStatus::Completed);
        assert_eq!(output.tree.get_path("Select1.value").as_deref(), Some(&json!(7)));
        assert_eq!(output.tree.get_path("Input1.text").as_deref(), Some(&json!(7)));
        assert_eq!(output.evaluated, vec!["Select1.value", "Input1.text"]);
        assert!(output.errors.is_empty());
        assert_eq!(input.get_path("Input1.text").as_deref(), Some(&json!("{{Select1.value}}")));
    }

    #[test]
    fn cycles_return_the_input_unchanged() {
        let input = tree(json!({
            "A": {"x": "{{B.x}}", "dynamicBindings": {"x": true}},
            "B": {"x": "{{A.x}}", "dynamicBindings": {"x": true}}
        }));

        let output = run(&input);
        assert_eq!(
            output.status,
            PassStatus::CycleDetected {
                paths: vec!["A.x".into(), "B.x".into()]
            }
        );
        assert_eq!(output.tree, input);
        assert!(output.evaluated.is_empty());
        assert!(output.validation.is_empty());
    }

    #[test]
    fn cycles_still_parse_values_when_requested() {
        let input = tree(json!({
            "A": {"type": "INPUT_WIDGET", "x": "{{B.x}}", "count": 5, "dynamicBindings": {"x": true}},
            "B": {"type": "INPUT_WIDGET", "x": "{{A.x}}", "dynamicBindings": {"x": true}}
        }));
        let mut registry = ValidatorRegistry::new();
        registry.register_rule("INPUT_WIDGET", "count", ValidationType::Text.into());

        let output = evaluate_data_tree(&input, &Interpreter::new(), Some(&registry), PassOptions { parse_values: true });
        assert!(matches!(output.status, PassStatus::CycleDetected { .. }));
        assert_eq!(output.tree.get_path("A.count").as_deref(), Some(&json!("5")));
        assert_eq!(output.tree.get_path("A.x").as_deref(), Some(&json!("{{B.x}}")));
        assert!(output.validation["A"].is_valid());
        assert!(!output.validation.contains_key("B"));
        assert!(output.evaluated.is_empty());
    }

    #[test]
    fn literals_and_unflagged_values_pass_through() {
        let input = tree(json!({
            "Text1": {"type": "TEXT_WIDGET", "text": "plain", "note": "{{1 + 1}}", "dynamicBindings": {"text": true}}
        }));

        let output = run(&input);
        assert_eq!(output.tree, input);
        assert!(output.evaluated.is_empty());
    }

    #[test]
    fn bindings_without_tree_references_are_still_evaluated() {
        let input = tree(json!({
            "Text1": {"text": "{{1 + 1}}", "label": "Total: {{2 * 3}}", "dynamicBindings": ["text", "label"]}
        }));

        let output = run(&input);
        assert_eq!(output.tree.get_path("Text1.text").as_deref(), Some(&json!(2)));
        assert_eq!(output.tree.get_path("Text1.label").as_deref(), Some(&json!("Total: 6")));
    }

    #[test]
    fn failures_are_isolated_to_their_path() {
        let input = tree(json!({
            "Text1": {"bad": "{{Missing.value}}", "good": "{{Text2.count + 1}}", "dynamicBindings": ["bad", "good"]},
            "Text2": {"count": 1}
        }));

        let output = run(&input);
        assert_eq!(output.tree.get_path("Text1.bad").as_deref(), Some(&Value::Null));
        assert_eq!(output.tree.get_path("Text1.good").as_deref(), Some(&json!(2)));
        assert_eq!(output.errors["Text1.bad"], "Missing is not defined");
    }

    #[test]
    fn oversized_string_results_fail_only_their_path() {
        let input = tree(json!({
            "Text1": {"big": "{{'ab'.repeat(1e19)}}", "pad": "{{'x'.padStart(1e15)}}", "ok": "{{1 + 1}}", "dynamicBindings": ["big", "pad", "ok"]}
        }));

        let output = run(&input);
        assert_eq!(output.status, PassStatus::Completed);
        assert_eq!(output.tree.get_path("Text1.big").as_deref(), Some(&Value::Null));
        assert_eq!(output.tree.get_path("Text1.pad").as_deref(), Some(&Value::Null));
        assert_eq!(output.tree.get_path("Text1.ok").as_deref(), Some(&json!(2)));
        assert_eq!(output.errors["Text1.big"], "Invalid string length");
        assert_eq!(output.errors["Text1.pad"], "Invalid string length");
        assert_eq!(output.errors.len(), 2);
    }

    #[test]
    fn undefined_results_remove_the_property() {
        let input = tree(json!({
            "Text1": {"text": "{{Text2.missing}}", "dynamicBindings": ["text"]},
            "Text2": {"count": 1}
        }));

        let output = run(&input);
        assert_eq!(output.tree.get_path("Text1.text"), None);
        assert!(output.tree.get("Text1").expect("entity").dynamic_bindings.contains("text"));
    }

    #[test]
    fn second_pass_over_evaluated_tree_is_a_no_op() {
        let input = tree(json!({
            "Select1": {"value": "{{Table1.selectedRow.id}}", "dynamicBindings": {"value": true}},
            "Table1": {"selectedRow": {"id": 7}}
        }));

        let first = run(&input);
        let second = run(&first.tree);
        assert_eq!(second.tree, first.tree);
        assert!(second.evaluated.is_empty());
    }

    #[test]
    fn parse_values_applies_registered_validators() {
        let input = tree(json!({
            "Input1": {"type": "INPUT_WIDGET", "text": "{{40 + 2}}", "dynamicBindings": {"text": true}}
        }));
        let mut registry = ValidatorRegistry::new();
        registry.register_rule("INPUT_WIDGET", "text", ValidationType::Text.into());

        let unparsed = evaluate_data_tree(&input, &Interpreter::new(), Some(&registry), PassOptions::default());
        assert_eq!(unparsed.tree.get_path("Input1.text").as_deref(), Some(&json!(42)));
        assert!(unparsed.validation.is_empty());

        let parsed = evaluate_data_tree(&input, &Interpreter::new(), Some(&registry), PassOptions { parse_values: true });
        assert_eq!(parsed.tree.get_path("Input1.text").as_deref(), Some(&json!("42")));
        assert!(parsed.validation["Input1"].is_valid());
    }

    struct Constant;

    impl ExpressionEvaluator for Constant {
        fn evaluate(&self, _expression: &str, _scope: &dyn Scope) -> Result<Option<Value>, ExpressionError> {
            Ok(Some(json!("stub")))
        }
    }

    #[test]
    fn tree_evaluator_publishes_each_generation() {
        let input = tree(json!({"Text1": {"text": "{{anything}}", "dynamicBindings": ["text"]}}));
        let mut evaluator = TreeEvaluator::new(Constant);
        assert_eq!(evaluator.published().generation, 0);

        let before = evaluator.published();
        let first = evaluator.run_pass(&input);
        assert_eq!(first.generation, 1);
        assert_eq!(first.tree.get_path("Text1.text").as_deref(), Some(&json!("stub")));
        assert_eq!(before.generation, 0);

        evaluator.run_pass(&input);
        assert_eq!(evaluator.generation(), 2);
        assert_eq!(evaluator.published().generation, 2);
    }
}
