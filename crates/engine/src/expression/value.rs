//! Runtime values and JavaScript-style coercions.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rebind_util::{format_js_number, number_value};
use serde_json::{Map, Value};

use super::ast::Expr;
use super::builtins::Builtin;

/// Value produced while evaluating an expression.
///
/// Containers are reference counted so member access and argument passing
/// never deep-copy tree data.
#[derive(Debug, Clone)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<JsValue>>),
    Object(Rc<IndexMap<String, JsValue>>),
    Function(Function),
}

#[derive(Debug, Clone)]
pub enum Function {
    Builtin(Builtin),
    Arrow(Rc<ArrowFunction>),
}

/// Arrow function with the local bindings visible where it was created.
#[derive(Debug)]
pub struct ArrowFunction {
    pub parameters: Vec<String>,
    pub body: Rc<Expr>,
    pub captured: HashMap<String, JsValue>,
}

impl JsValue {
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        JsValue::String(text.into())
    }

    pub fn array(items: Vec<JsValue>) -> Self {
        JsValue::Array(Rc::new(items))
    }

    pub fn object(entries: IndexMap<String, JsValue>) -> Self {
        JsValue::Object(Rc::new(entries))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null | JsValue::Array(_) | JsValue::Object(_) => "object",
            JsValue::Bool(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Function(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Bool(flag) => *flag,
            JsValue::Number(number) => *number != 0.0 && !number.is_nan(),
            JsValue::String(text) => !text.is_empty(),
            JsValue::Array(_) | JsValue::Object(_) | JsValue::Function(_) => true,
        }
    }

    /// `Number(value)`.
    pub fn to_number(&self) -> f64 {
        match self {
            JsValue::Undefined | JsValue::Function(_) | JsValue::Object(_) => f64::NAN,
            JsValue::Null => 0.0,
            JsValue::Bool(flag) => f64::from(u8::from(*flag)),
            JsValue::Number(number) => *number,
            JsValue::String(text) => string_to_number(text),
            JsValue::Array(_) => string_to_number(&self.to_js_string()),
        }
    }

    /// `String(value)`.
    pub fn to_js_string(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Bool(flag) => flag.to_string(),
            JsValue::Number(number) => format_js_number(*number),
            JsValue::String(text) => text.to_string(),
            JsValue::Array(items) => items
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_js_string() })
                .collect::<Vec<_>>()
                .join(","),
            JsValue::Object(_) => "[object Object]".to_string(),
            JsValue::Function(_) => "function () { [native code] }".to_string(),
        }
    }

    /// Property key spelling of a value used in `obj[key]` or `key in obj`.
    pub fn to_property_key(&self) -> String {
        self.to_js_string()
    }

    /// Converts to JSON; `None` stands for `undefined`.
    ///
    /// Follows `JSON.stringify`: functions and `undefined` vanish from
    /// objects and become `null` inside arrays, non-finite numbers become `null`.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            JsValue::Undefined | JsValue::Function(_) => None,
            JsValue::Null => Some(Value::Null),
            JsValue::Bool(flag) => Some(Value::Bool(*flag)),
            JsValue::Number(number) => Some(number_value(*number)),
            JsValue::String(text) => Some(Value::String(text.to_string())),
            JsValue::Array(items) => Some(Value::Array(
                items.iter().map(|item| item.to_json().unwrap_or(Value::Null)).collect(),
            )),
            JsValue::Object(entries) => Some(Value::Object(
                entries
                    .iter()
                    .filter_map(|(key, item)| item.to_json().map(|json| (key.clone(), json)))
                    .collect::<Map<_, _>>(),
            )),
        }
    }

    /// Strict equality (`===`). Containers compare by content.
    pub fn strict_equals(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Undefined) | (JsValue::Null, JsValue::Null) => true,
            (JsValue::Bool(left), JsValue::Bool(right)) => left == right,
            (JsValue::Number(left), JsValue::Number(right)) => left == right,
            (JsValue::String(left), JsValue::String(right)) => left == right,
            (JsValue::Array(left), JsValue::Array(right)) => {
                Rc::ptr_eq(left, right)
                    || (left.len() == right.len() && left.iter().zip(right.iter()).all(|(a, b)| a.strict_equals(b)))
            }
            (JsValue::Object(left), JsValue::Object(right)) => {
                Rc::ptr_eq(left, right)
                    || (left.len() == right.len()
                        && left
                            .iter()
                            .all(|(key, value)| right.get(key).is_some_and(|other| value.strict_equals(other))))
            }
            (JsValue::Function(Function::Arrow(left)), JsValue::Function(Function::Arrow(right))) => Rc::ptr_eq(left, right),
            (JsValue::Function(Function::Builtin(left)), JsValue::Function(Function::Builtin(right))) => left == right,
            _ => false,
        }
    }

    /// Abstract equality (`==`).
    pub fn loose_equals(&self, other: &JsValue) -> bool {
        match (self, other) {
            (left, right) if left.is_nullish() || right.is_nullish() => left.is_nullish() && right.is_nullish(),
            (JsValue::Number(_), JsValue::String(_)) | (JsValue::String(_), JsValue::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (JsValue::Bool(_), _) => JsValue::Number(self.to_number()).loose_equals(other),
            (_, JsValue::Bool(_)) => self.loose_equals(&JsValue::Number(other.to_number())),
            (JsValue::Array(_) | JsValue::Object(_), JsValue::Number(_) | JsValue::String(_)) => {
                JsValue::string(self.to_js_string()).loose_equals(other)
            }
            (JsValue::Number(_) | JsValue::String(_), JsValue::Array(_) | JsValue::Object(_)) => {
                self.loose_equals(&JsValue::string(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }
}

impl From<&Value> for JsValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => JsValue::Null,
            Value::Bool(flag) => JsValue::Bool(*flag),
            Value::Number(number) => JsValue::Number(number.as_f64().unwrap_or(f64::NAN)),
            Value::String(text) => JsValue::string(text.as_str()),
            Value::Array(items) => JsValue::array(items.iter().map(JsValue::from).collect()),
            Value::Object(map) => JsValue::object(map.iter().map(|(key, item)| (key.clone(), JsValue::from(item))).collect()),
        }
    }
}

impl From<Option<&Value>> for JsValue {
    fn from(value: Option<&Value>) -> Self {
        value.map(JsValue::from).unwrap_or(JsValue::Undefined)
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_js_string())
    }
}

/// `Number(text)`: whitespace-trimmed decimal, hex/binary/octal prefixes and
/// `Infinity`; the empty string is zero and anything else is `NaN`.
pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let (sign, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (-1.0, &trimmed[1..]),
        b'+' => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0b", 2), ("0B", 2), ("0o", 8), ("0O", 8)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix).map(|value| value as f64).unwrap_or(f64::NAN);
        }
    }
    // Rust accepts spellings such as "inf" and "nan" that JavaScript does not.
    if !unsigned.bytes().all(|byte| byte.is_ascii_digit() || matches!(byte, b'.' | b'e' | b'E' | b'+' | b'-')) {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_number_follows_javascript_coercion() {
        assert_eq!(JsValue::string(" 42 ").to_number(), 42.0);
        assert_eq!(JsValue::string("").to_number(), 0.0);
        assert_eq!(JsValue::string("0x10").to_number(), 16.0);
        assert!(JsValue::string("12px").to_number().is_nan());
        assert!(JsValue::string("inf").to_number().is_nan());
        assert_eq!(JsValue::string("-Infinity").to_number(), f64::NEG_INFINITY);
        assert_eq!(JsValue::Null.to_number(), 0.0);
        assert!(JsValue::Undefined.to_number().is_nan());
        assert_eq!(JsValue::from(&json!([5])).to_number(), 5.0);
    }

    #[test]
    fn to_js_string_matches_string_constructor() {
        assert_eq!(JsValue::from(&json!([1, null, "a"])).to_js_string(), "1,,a");
        assert_eq!(JsValue::from(&json!({"a": 1})).to_js_string(), "[object Object]");
        assert_eq!(JsValue::Number(1.5).to_js_string(), "1.5");
    }

    #[test]
    fn loose_equality_coerces_across_types() {
        assert!(JsValue::Null.loose_equals(&JsValue::Undefined));
        assert!(!JsValue::Null.loose_equals(&JsValue::Number(0.0)));
        assert!(JsValue::Number(1.0).loose_equals(&JsValue::string("1")));
        assert!(JsValue::Bool(true).loose_equals(&JsValue::Number(1.0)));
        assert!(JsValue::from(&json!([1, 2])).loose_equals(&JsValue::string("1,2")));
        assert!(!JsValue::Number(f64::NAN).loose_equals(&JsValue::Number(f64::NAN)));
    }

    #[test]
    fn to_json_drops_undefined_members() {
        let mut entries = IndexMap::new();
        entries.insert("kept".to_string(), JsValue::Number(1.0));
        entries.insert("dropped".to_string(), JsValue::Undefined);
        entries.insert("list".to_string(), JsValue::array(vec![JsValue::Undefined, JsValue::Number(f64::NAN)]));
        assert_eq!(JsValue::object(entries).to_json(), Some(json!({"kept": 1, "list": [null, null]})));
        assert_eq!(JsValue::Undefined.to_json(), None);
    }
}
