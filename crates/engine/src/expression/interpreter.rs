//! Tree-walking evaluation of parsed expressions.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use super::ast::{ArrayElement, BinaryOperator, Expr, LogicalOperator, ObjectMember, PropertyKey, TemplatePart, UnaryOperator};
use super::builtins;
use super::parser::parse_expression;
use super::value::{ArrowFunction, Function, JsValue};
use super::{ExpressionError, ExpressionEvaluator, Scope};

/// Default limit on nested evaluation frames.
pub const MAX_EVALUATION_DEPTH: usize = 256;

/// The built-in expression evaluator.
///
/// Parses each expression into an AST and walks it against the scope. Names
/// resolve to arrow function parameters first, then to scope entries, then to
/// the built-in globals (`Math`, `JSON`, `parseInt`, ...).
#[derive(Debug, Clone)]
pub struct Interpreter {
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            max_depth: MAX_EVALUATION_DEPTH,
        }
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl ExpressionEvaluator for Interpreter {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> Result<Option<Value>, ExpressionError> {
        let ast = parse_expression(expression)?;
        let mut evaluation = Evaluation::new(scope, self.max_depth);
        Ok(evaluation.evaluate(&ast)?.to_json())
    }
}

/// Control flow out of a subexpression.
pub(super) enum Interrupt {
    /// An optional link met `null`/`undefined`; the enclosing chain yields `undefined`.
    ShortCircuit,
    Error(ExpressionError),
}

impl From<ExpressionError> for Interrupt {
    fn from(error: ExpressionError) -> Self {
        Interrupt::Error(error)
    }
}

pub(super) type Flow<T> = Result<T, Interrupt>;

/// State of a single top-level evaluation.
pub(super) struct Evaluation<'a> {
    scope: &'a dyn Scope,
    resolved: HashMap<String, JsValue>,
    locals: Vec<HashMap<String, JsValue>>,
    depth: usize,
    max_depth: usize,
}

impl<'a> Evaluation<'a> {
    pub(super) fn new(scope: &'a dyn Scope, max_depth: usize) -> Self {
        Self {
            scope,
            resolved: HashMap::new(),
            locals: Vec::new(),
            depth: 0,
            max_depth,
        }
    }

    pub(super) fn evaluate(&mut self, expression: &Expr) -> Result<JsValue, ExpressionError> {
        match self.eval(expression) {
            Ok(value) => Ok(value),
            Err(Interrupt::ShortCircuit) => Ok(JsValue::Undefined),
            Err(Interrupt::Error(error)) => Err(error),
        }
    }

    fn eval(&mut self, expression: &Expr) -> Flow<JsValue> {
        self.depth += 1;
        if self.depth > self.max_depth {
            self.depth -= 1;
            return Err(ExpressionError::TooDeep { limit: self.max_depth }.into());
        }
        let result = self.eval_node(expression);
        self.depth -= 1;
        result
    }

    fn eval_node(&mut self, expression: &Expr) -> Flow<JsValue> {
        match expression {
            Expr::Number(number) => Ok(JsValue::Number(*number)),
            Expr::String(text) => Ok(JsValue::string(text.as_str())),
            Expr::Boolean(flag) => Ok(JsValue::Bool(*flag)),
            Expr::Null => Ok(JsValue::Null),
            Expr::Undefined => Ok(JsValue::Undefined),
            Expr::Identifier(name) => Ok(self.resolve(name)?),
            Expr::Template(parts) => {
                let mut rendered = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => rendered.push_str(text),
                        TemplatePart::Expression(inner) => rendered.push_str(&self.eval(inner)?.to_js_string()),
                    }
                }
                Ok(JsValue::string(rendered))
            }
            Expr::Array(elements) => Ok(JsValue::array(self.eval_elements(elements)?)),
            Expr::Object(members) => self.eval_object(members),
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let target = self.eval(object)?;
                if *optional && target.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                let key = self.property_key(property)?;
                Ok(get_property(&target, &key)?)
            }
            Expr::Call {
                callee,
                arguments,
                optional,
            } => self.eval_call(callee, arguments, *optional),
            Expr::OptionalChain(inner) => match self.eval(inner) {
                Err(Interrupt::ShortCircuit) => Ok(JsValue::Undefined),
                other => other,
            },
            Expr::Unary { operator, operand } => self.eval_unary(*operator, operand),
            Expr::Binary { operator, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(apply_binary(*operator, &left, &right)?)
            }
            Expr::Logical { operator, left, right } => {
                let left = self.eval(left)?;
                let short_circuits = match operator {
                    LogicalOperator::And => !left.is_truthy(),
                    LogicalOperator::Or => left.is_truthy(),
                    LogicalOperator::Coalesce => !left.is_nullish(),
                };
                if short_circuits { Ok(left) } else { self.eval(right) }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Arrow { parameters, body } => {
                let mut captured = HashMap::new();
                for frame in &self.locals {
                    captured.extend(frame.iter().map(|(name, value)| (name.clone(), value.clone())));
                }
                Ok(JsValue::Function(Function::Arrow(Rc::new(ArrowFunction {
                    parameters: parameters.clone(),
                    body: Rc::clone(body),
                    captured,
                }))))
            }
        }
    }

    fn resolve(&mut self, name: &str) -> Result<JsValue, ExpressionError> {
        for frame in self.locals.iter().rev() {
            if let Some(value) = frame.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.resolved.get(name) {
            return Ok(value.clone());
        }
        let value = match self.scope.lookup(name) {
            Some(json) => JsValue::from(&json),
            None => builtins::global(name).ok_or_else(|| ExpressionError::Reference { name: name.to_string() })?,
        };
        self.resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn property_key(&mut self, property: &PropertyKey) -> Flow<String> {
        match property {
            PropertyKey::Named(name) => Ok(name.clone()),
            PropertyKey::Computed(expression) => Ok(self.eval(expression)?.to_property_key()),
        }
    }

    fn eval_elements(&mut self, elements: &[ArrayElement]) -> Flow<Vec<JsValue>> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                ArrayElement::Item(expression) => values.push(self.eval(expression)?),
                ArrayElement::Spread(expression) => match self.eval(expression)? {
                    JsValue::Array(items) => values.extend(items.iter().cloned()),
                    JsValue::String(text) => values.extend(text.chars().map(|character| JsValue::string(character.to_string()))),
                    other => {
                        return Err(ExpressionError::Type {
                            message: format!("{} is not iterable", other.to_js_string()),
                        }
                        .into());
                    }
                },
            }
        }
        Ok(values)
    }

    fn eval_object(&mut self, members: &[ObjectMember]) -> Flow<JsValue> {
        let mut entries = IndexMap::new();
        for member in members {
            match member {
                ObjectMember::Property(key, expression) => {
                    let key = self.property_key(key)?;
                    let value = self.eval(expression)?;
                    entries.insert(key, value);
                }
                ObjectMember::Spread(expression) => match self.eval(expression)? {
                    JsValue::Object(source) => entries.extend(source.iter().map(|(key, value)| (key.clone(), value.clone()))),
                    JsValue::Array(items) => {
                        entries.extend(items.iter().enumerate().map(|(index, value)| (index.to_string(), value.clone())))
                    }
                    JsValue::String(text) => entries.extend(
                        text.chars()
                            .enumerate()
                            .map(|(index, character)| (index.to_string(), JsValue::string(character.to_string()))),
                    ),
                    _ => {}
                },
            }
        }
        Ok(JsValue::object(entries))
    }

    fn eval_unary(&mut self, operator: UnaryOperator, operand: &Expr) -> Flow<JsValue> {
        if operator == UnaryOperator::TypeOf {
            // typeof tolerates undeclared names
            if let Expr::Identifier(name) = operand {
                return Ok(match self.resolve(name) {
                    Ok(value) => JsValue::string(value.type_of()),
                    Err(ExpressionError::Reference { .. }) => JsValue::string("undefined"),
                    Err(error) => return Err(error.into()),
                });
            }
            return Ok(JsValue::string(self.eval(operand)?.type_of()));
        }

        let value = self.eval(operand)?;
        Ok(match operator {
            UnaryOperator::Not => JsValue::Bool(!value.is_truthy()),
            UnaryOperator::Negate => JsValue::Number(-value.to_number()),
            UnaryOperator::Plus => JsValue::Number(value.to_number()),
            UnaryOperator::TypeOf => JsValue::string(value.type_of()),
        })
    }

    fn eval_call(&mut self, callee: &Expr, arguments: &[ArrayElement], optional: bool) -> Flow<JsValue> {
        if let Expr::Member {
            object,
            property,
            optional: member_optional,
        } = callee
        {
            let target = self.eval(object)?;
            if *member_optional && target.is_nullish() {
                return Err(Interrupt::ShortCircuit);
            }
            let key = self.property_key(property)?;
            let method = get_property(&target, &key)?;
            if optional && method.is_nullish() && !builtins::has_method(&target, &key) {
                return Err(Interrupt::ShortCircuit);
            }
            let arguments = self.eval_elements(arguments)?;
            if let JsValue::Function(function) = method {
                return self.call_function(&function, arguments);
            }
            return match builtins::call_method(self, &target, &key, arguments)? {
                Some(value) => Ok(value),
                None => Err(not_a_function(callee).into()),
            };
        }

        let function = self.eval(callee)?;
        if optional && function.is_nullish() {
            return Err(Interrupt::ShortCircuit);
        }
        let arguments = self.eval_elements(arguments)?;
        match function {
            JsValue::Function(function) => self.call_function(&function, arguments),
            _ => Err(not_a_function(callee).into()),
        }
    }

    pub(super) fn call_function(&mut self, function: &Function, arguments: Vec<JsValue>) -> Flow<JsValue> {
        match function {
            Function::Builtin(builtin) => Ok(builtins::call_builtin(*builtin, &arguments)?),
            Function::Arrow(arrow) => {
                let mut frame = arrow.captured.clone();
                for (index, parameter) in arrow.parameters.iter().enumerate() {
                    frame.insert(parameter.clone(), arguments.get(index).cloned().unwrap_or(JsValue::Undefined));
                }
                let outer = std::mem::replace(&mut self.locals, vec![frame]);
                let result = self.eval(&arrow.body);
                self.locals = outer;
                // A short-circuit never escapes a function body.
                match result {
                    Err(Interrupt::ShortCircuit) => Ok(JsValue::Undefined),
                    other => other,
                }
            }
        }
    }
}

fn not_a_function(callee: &Expr) -> ExpressionError {
    ExpressionError::Type {
        message: format!("{} is not a function", describe_callee(callee)),
    }
}

fn describe_callee(callee: &Expr) -> String {
    match callee {
        Expr::Identifier(name) => name.clone(),
        Expr::Member { object, property, .. } => match property.as_ref() {
            PropertyKey::Named(name) => format!("{}.{name}", describe_callee(object)),
            PropertyKey::Computed(_) => format!("{}[...]", describe_callee(object)),
        },
        Expr::OptionalChain(inner) => describe_callee(inner),
        _ => "expression".to_string(),
    }
}

/// Reads `target[key]` with JavaScript semantics for primitives and containers.
pub(super) fn get_property(target: &JsValue, key: &str) -> Result<JsValue, ExpressionError> {
    match target {
        JsValue::Undefined | JsValue::Null => Err(ExpressionError::Type {
            message: format!("Cannot read properties of {} (reading '{key}')", target.to_js_string()),
        }),
        JsValue::String(text) => Ok(match key {
            "length" => JsValue::Number(text.encode_utf16().count() as f64),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|index| text.chars().nth(index))
                .map(|character| JsValue::string(character.to_string()))
                .unwrap_or(JsValue::Undefined),
        }),
        JsValue::Array(items) => Ok(match key {
            "length" => JsValue::Number(items.len() as f64),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index).cloned())
                .unwrap_or(JsValue::Undefined),
        }),
        JsValue::Object(entries) => Ok(entries.get(key).cloned().unwrap_or(JsValue::Undefined)),
        JsValue::Bool(_) | JsValue::Number(_) | JsValue::Function(_) => Ok(JsValue::Undefined),
    }
}

fn apply_binary(operator: BinaryOperator, left: &JsValue, right: &JsValue) -> Result<JsValue, ExpressionError> {
    Ok(match operator {
        BinaryOperator::Add => {
            let left = to_primitive(left);
            let right = to_primitive(right);
            if matches!(left, JsValue::String(_)) || matches!(right, JsValue::String(_)) {
                JsValue::string(format!("{}{}", left.to_js_string(), right.to_js_string()))
            } else {
                JsValue::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOperator::Subtract => JsValue::Number(left.to_number() - right.to_number()),
        BinaryOperator::Multiply => JsValue::Number(left.to_number() * right.to_number()),
        BinaryOperator::Divide => JsValue::Number(left.to_number() / right.to_number()),
        BinaryOperator::Remainder => JsValue::Number(left.to_number() % right.to_number()),
        BinaryOperator::Exponent => JsValue::Number(builtins::js_pow(left.to_number(), right.to_number())),
        BinaryOperator::LooseEqual => JsValue::Bool(left.loose_equals(right)),
        BinaryOperator::LooseNotEqual => JsValue::Bool(!left.loose_equals(right)),
        BinaryOperator::StrictEqual => JsValue::Bool(left.strict_equals(right)),
        BinaryOperator::StrictNotEqual => JsValue::Bool(!left.strict_equals(right)),
        BinaryOperator::Less => JsValue::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOperator::LessEqual => JsValue::Bool(matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal))),
        BinaryOperator::Greater => JsValue::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOperator::GreaterEqual => {
            JsValue::Bool(matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)))
        }
        BinaryOperator::In => {
            let key = left.to_property_key();
            match right {
                JsValue::Object(entries) => JsValue::Bool(entries.contains_key(&key)),
                JsValue::Array(items) => JsValue::Bool(key == "length" || key.parse::<usize>().is_ok_and(|index| index < items.len())),
                other => {
                    return Err(ExpressionError::Type {
                        message: format!("Cannot use 'in' operator to search for '{key}' in {}", other.to_js_string()),
                    });
                }
            }
        }
    })
}

fn to_primitive(value: &JsValue) -> JsValue {
    match value {
        JsValue::Array(_) | JsValue::Object(_) | JsValue::Function(_) => JsValue::string(value.to_js_string()),
        other => other.clone(),
    }
}

fn compare(left: &JsValue, right: &JsValue) -> Option<Ordering> {
    let left = to_primitive(left);
    let right = to_primitive(right);
    if let (JsValue::String(left), JsValue::String(right)) = (&left, &right) {
        return Some(left.encode_utf16().cmp(right.encode_utf16()));
    }
    left.to_number().partial_cmp(&right.to_number())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn scope() -> Map<String, Value> {
        json!({
            "Table1": {
                "type": "TABLE_WIDGET",
                "selectedRow": {"id": 7, "name": "Ada"},
                "tableData": [{"id": 1, "name": "Grace"}, {"id": 7, "name": "Ada"}]
            },
            "Input1": {"text": "42", "isVisible": true},
            "Empty": {}
        })
        .as_object()
        .cloned()
        .expect("object scope")
    }

    fn eval(expression: &str) -> Option<Value> {
        Interpreter::new()
            .evaluate(expression, &scope())
            .unwrap_or_else(|error| panic!("{expression}: {error}"))
    }

    fn eval_err(expression: &str) -> ExpressionError {
        Interpreter::new().evaluate(expression, &scope()).expect_err(expression)
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 1"), Some(json!(2)));
        assert_eq!(eval("1 + 2 * 3 - 4 / 2"), Some(json!(5)));
        assert_eq!(eval("(1 + 2) * 3"), Some(json!(9)));
        assert_eq!(eval("7 % 4 + 2 ** 3"), Some(json!(11)));
        assert_eq!(eval("0.1 + 0.2"), Some(json!(0.30000000000000004)));
        assert_eq!(eval("1 / 0"), Some(Value::Null));
        assert_eq!(eval("-Input1.text + 1"), Some(json!(-41)));
    }

    #[test]
    fn string_concatenation_and_templates() {
        assert_eq!(eval("'a' + 1"), Some(json!("a1")));
        assert_eq!(eval("1 + 2 + 'px'"), Some(json!("3px")));
        assert_eq!(eval("Input1.text + 1"), Some(json!("421")));
        assert_eq!(eval("`Hi ${Table1.selectedRow.name}!`"), Some(json!("Hi Ada!")));
        assert_eq!(eval("[1, 2] + ''"), Some(json!("1,2")));
    }

    #[test]
    fn member_access_reads_scope_values() {
        assert_eq!(eval("Table1.selectedRow.id"), Some(json!(7)));
        assert_eq!(eval("Table1['selectedRow']['name']"), Some(json!("Ada")));
        assert_eq!(eval("Table1.tableData[1].name"), Some(json!("Ada")));
        assert_eq!(eval("Table1.tableData.length"), Some(json!(2)));
        assert_eq!(eval("Table1.type"), Some(json!("TABLE_WIDGET")));
        assert_eq!(eval("Table1.missing"), None);
        assert_eq!(eval("'abc'[1]"), Some(json!("b")));
    }

    #[test]
    fn logical_and_conditional_operators_short_circuit() {
        assert_eq!(eval("Input1.isVisible && 'shown'"), Some(json!("shown")));
        assert_eq!(eval("Empty.value || 'fallback'"), Some(json!("fallback")));
        assert_eq!(eval("0 ?? 5"), Some(json!(0)));
        assert_eq!(eval("Empty.value ?? 5"), Some(json!(5)));
        assert_eq!(eval("Table1.selectedRow.id > 5 ? 'big' : 'small'"), Some(json!("big")));
        assert_eq!(eval("false && Missing.value"), Some(json!(false)));
    }

    #[test]
    fn equality_follows_loose_and_strict_rules() {
        assert_eq!(eval("Input1.text == 42"), Some(json!(true)));
        assert_eq!(eval("Input1.text === 42"), Some(json!(false)));
        assert_eq!(eval("null == undefined"), Some(json!(true)));
        assert_eq!(eval("null === undefined"), Some(json!(false)));
        assert_eq!(eval("'b' > 'a'"), Some(json!(true)));
        assert_eq!(eval("'selectedRow' in Table1"), Some(json!(true)));
    }

    #[test]
    fn typeof_reports_types_and_tolerates_unknown_names() {
        assert_eq!(eval("typeof Table1.tableData"), Some(json!("object")));
        assert_eq!(eval("typeof Input1.text"), Some(json!("string")));
        assert_eq!(eval("typeof nothingHere"), Some(json!("undefined")));
        assert_eq!(eval("typeof Math.max"), Some(json!("function")));
    }

    #[test]
    fn optional_chaining_short_circuits_whole_chain() {
        assert_eq!(eval("Empty.value?.deep.deeper"), None);
        assert_eq!(eval("Empty.value?.[0]"), None);
        assert_eq!(eval("Empty.call?.()"), None);
        assert_eq!(eval("Table1?.selectedRow.name"), Some(json!("Ada")));
    }

    #[test]
    fn arrow_callbacks_drive_array_methods() {
        assert_eq!(eval("Table1.tableData.map(row => row.id)"), Some(json!([1, 7])));
        assert_eq!(
            eval("Table1.tableData.filter(row => row.id > 1).map(row => ({label: row.name, value: row.id}))"),
            Some(json!([{"label": "Ada", "value": 7}]))
        );
        assert_eq!(eval("Table1.tableData.find(row => row.name === 'Grace').id"), Some(json!(1)));
        assert_eq!(eval("[1, 2, 3].map((n, i) => n * i)"), Some(json!([0, 2, 6])));
        assert_eq!(eval("((factor) => [1, 2].map(n => n * factor))(10)"), Some(json!([10, 20])));
    }

    #[test]
    fn literals_build_arrays_and_objects() {
        assert_eq!(eval("{a: 1, 'b': [true, null], ...{c: 'x'}}"), Some(json!({"a": 1, "b": [true, null], "c": "x"})));
        assert_eq!(eval("[...[1, 2], 3]"), Some(json!([1, 2, 3])));
        assert_eq!(eval("undefined"), None);
        assert_eq!(eval("[undefined]"), Some(json!([null])));
    }

    #[test]
    fn reports_reference_and_type_errors() {
        assert_eq!(eval_err("Missing.value"), ExpressionError::Reference { name: "Missing".into() });
        assert!(matches!(eval_err("Empty.value.deep"), ExpressionError::Type { .. }));
        assert!(matches!(eval_err("Input1.text()"), ExpressionError::Type { .. }));
        assert!(matches!(eval_err("Table1.tableData.nope()"), ExpressionError::Type { .. }));
        assert!(matches!(eval_err("1 +"), ExpressionError::Syntax { .. }));
    }

    #[test]
    fn evaluation_depth_is_bounded() {
        let shallow = Interpreter::with_max_depth(8);
        let error = shallow
            .evaluate("[[[[[[[[[[1]]]]]]]]]]", &Map::new())
            .expect_err("too deep");
        assert_eq!(error, ExpressionError::TooDeep { limit: 8 });
        assert_eq!(shallow.evaluate("[[1]]", &Map::new()).expect("shallow"), Some(json!([[1]])));
    }
}
