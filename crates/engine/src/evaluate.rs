//! Evaluation of raw binding strings.
//!
//! A binding string with exactly one segment evaluates to that segment's
//! value with its native type (`{{Table1.tableData}}` yields the array). With
//! several segments the result is always a string: each segment's value is
//! rendered as text and spliced back into the raw string.

use rebind_util::{format_template_value, unescape_js};
use serde_json::Value;

use crate::bindings::{DynamicBindings, get_dynamic_bindings};
use crate::expression::{ExpressionError, ExpressionEvaluator, Scope};

/// Evaluates the source of one `{{ ... }}` region after decoding JS escapes.
pub fn evaluate_dynamic_bound_value(
    evaluator: &dyn ExpressionEvaluator,
    scope: &dyn Scope,
    path: &str,
) -> Result<Option<Value>, ExpressionError> {
    let unescaped = unescape_js(path);
    evaluator.evaluate(&unescaped, scope)
}

/// Evaluates a raw binding string; `Ok(None)` is `undefined`.
///
/// An empty (or all-whitespace) input yields `undefined`. Literal segments
/// and empty `{{}}` regions evaluate to their own text.
///
/// # Errors
///
/// Returns the first [`ExpressionError`] raised by any segment.
pub fn get_dynamic_value(
    evaluator: &dyn ExpressionEvaluator,
    scope: &dyn Scope,
    dynamic_binding: &str,
) -> Result<Option<Value>, ExpressionError> {
    let DynamicBindings { bindings, paths } = get_dynamic_bindings(dynamic_binding);
    if bindings.is_empty() {
        return Ok(None);
    }

    let mut values = Vec::with_capacity(bindings.len());
    for (binding, path) in bindings.iter().zip(&paths) {
        if path.is_empty() {
            values.push(Some(Value::String((*binding).to_string())));
        } else {
            values.push(evaluate_dynamic_bound_value(evaluator, scope, path)?);
        }
    }

    if values.len() == 1 {
        return Ok(values.into_iter().next().flatten());
    }
    Ok(Some(Value::String(create_dynamic_value_string(dynamic_binding, &bindings, &values))))
}

/// Splices segment values back into the raw binding string.
///
/// Segments are processed in order and each replaces the first remaining
/// occurrence of its own text in the progressively rewritten string. Strings
/// are inserted verbatim, objects and arrays as compact JSON, `undefined` as
/// `"undefined"`.
pub fn create_dynamic_value_string(binding: &str, sub_bindings: &[&str], sub_values: &[Option<Value>]) -> String {
    let mut final_value = binding.to_string();
    for (sub_binding, value) in sub_bindings.iter().zip(sub_values) {
        let rendered = format_template_value(value.as_ref());
        final_value = final_value.replacen(sub_binding, &rendered, 1);
    }
    final_value
}
