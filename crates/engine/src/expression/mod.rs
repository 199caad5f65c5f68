//! # Expression Evaluation
//!
//! Binding expressions are single JavaScript-like expressions evaluated
//! against the entities of a data tree. The engine reaches the evaluator only
//! through [`ExpressionEvaluator`], so the built-in [`Interpreter`] can be
//! swapped for another implementation (a sandboxed JavaScript runtime, or a
//! stub in tests).
//!
//! The built-in interpreter supports literals (numbers, strings, template
//! literals, arrays, objects), member access with optional chaining, calls,
//! arrow functions as callbacks, the usual unary, arithmetic, comparison and
//! logical operators, and a small library of globals. Statements,
//! assignments and `new` are not part of the language.
//!
//! Results are JSON values. `None` stands for `undefined`; `NaN` and the
//! infinities surface as `null`.

use rebind_types::{DataTree, Entity};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod ast;
pub mod builtins;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

pub use interpreter::{Interpreter, MAX_EVALUATION_DEPTH};
pub use parser::parse_expression;
pub use value::JsValue;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },

    #[error("{name} is not defined")]
    Reference { name: String },

    #[error("{message}")]
    Type { message: String },

    #[error("expression exceeded the maximum evaluation depth of {limit}")]
    TooDeep { limit: usize },
}

impl ExpressionError {
    pub fn syntax(message: impl Into<String>, offset: usize) -> Self {
        ExpressionError::Syntax {
            message: message.into(),
            offset,
        }
    }

    /// Moves a syntax error offset by `by` bytes; used for nested sources.
    pub(crate) fn shifted(self, by: usize) -> Self {
        match self {
            ExpressionError::Syntax { message, offset } => ExpressionError::Syntax {
                message,
                offset: offset + by,
            },
            other => other,
        }
    }
}

/// Name resolution for the top-level identifiers of an expression.
pub trait Scope {
    /// Returns the value bound to `name`, or `None` when the name is unbound.
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Scope for DataTree {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).map(Entity::scope_value)
    }
}

impl Scope for Map<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Evaluates expression source against a scope.
///
/// Implementations must be side-effect free with respect to the scope:
/// evaluating the same expression against the same scope yields the same
/// result.
pub trait ExpressionEvaluator {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> Result<Option<Value>, ExpressionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_tree_scope_exposes_entity_scope_values() {
        let tree: DataTree = serde_json::from_value(json!({
            "Input1": {"type": "INPUT_WIDGET", "text": "hi", "dynamicBindings": {"text": true}}
        }))
        .expect("tree");

        assert_eq!(tree.lookup("Input1"), Some(json!({"type": "INPUT_WIDGET", "text": "hi"})));
        assert_eq!(tree.lookup("Missing"), None);

        let result = Interpreter::new().evaluate("Input1.text + '!'", &tree).expect("evaluates");
        assert_eq!(result, Some(json!("hi!")));
    }

    #[test]
    fn syntax_error_display_includes_offset() {
        let error = ExpressionError::syntax("unexpected end of expression", 3);
        assert_eq!(error.to_string(), "syntax error at offset 3: unexpected end of expression");
        assert_eq!(error.shifted(2), ExpressionError::syntax("unexpected end of expression", 5));
    }
}
