//! # JavaScript Value Conventions
//!
//! Evaluated bindings are stored as JSON, but the surrounding application reads
//! them the way a JavaScript runtime would. These helpers keep numbers and
//! string conversions consistent with that expectation: integral numbers stay
//! integers, non-finite numbers have no JSON form, and stringification follows
//! `String(value)` for primitives and `JSON.stringify` for containers.

use serde_json::{Number, Value};

/// Converts an `f64` into a JSON number.
///
/// Integral values inside the `i64` range are stored as integers so that `1 + 1`
/// serializes as `2` rather than `2.0`. `NaN` and infinities become `null`, the
/// same value `JSON.stringify` produces for them.
pub fn number_value(number: f64) -> Value {
    if !number.is_finite() {
        return Value::Null;
    }
    if number.fract() == 0.0 && number.abs() < 9.007_199_254_740_992e15 {
        // -0.0 collapses to 0 here, as it does in JSON.stringify
        return Value::Number(Number::from(number as i64));
    }
    Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
}

/// Formats a number the way JavaScript's `String(number)` does.
pub fn format_js_number(number: f64) -> String {
    if number.is_nan() {
        return "NaN".to_string();
    }
    if number.is_infinite() {
        return if number > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if number == 0.0 {
        return "0".to_string();
    }
    let magnitude = number.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let formatted = format!("{number:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{mantissa}e+{exponent}"),
            _ => formatted,
        };
    }
    if number.fract() == 0.0 {
        return format!("{number:.0}");
    }
    number.to_string()
}

/// Formats a JSON value the way a template substitution renders it.
///
/// `None` stands for `undefined`. Strings are inserted verbatim, other
/// primitives use their JavaScript spelling and objects or arrays are rendered
/// as compact JSON.
///
/// # Example
/// ```rust
/// use rebind_util::js_value::format_template_value;
/// use serde_json::json;
///
/// assert_eq!(format_template_value(Some(&json!("text"))), "text");
/// assert_eq!(format_template_value(Some(&json!(1.5))), "1.5");
/// assert_eq!(format_template_value(Some(&json!({"a": 1}))), r#"{"a":1}"#);
/// assert_eq!(format_template_value(None), "undefined");
/// ```
pub fn format_template_value(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Number(number)) => format_json_number(number),
        Some(container) => container.to_string(),
    }
}

/// Formats a JSON number with JavaScript spelling.
pub fn format_json_number(number: &Number) -> String {
    if let Some(integer) = number.as_i64() {
        return integer.to_string();
    }
    if let Some(integer) = number.as_u64() {
        return integer.to_string();
    }
    format_js_number(number.as_f64().unwrap_or(f64::NAN))
}

/// Reports whether a value is a JavaScript primitive (not an object or array).
pub fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_value_keeps_integers_integral() {
        assert_eq!(number_value(2.0), json!(2));
        assert_eq!(number_value(-7.0), json!(-7));
        assert_eq!(number_value(0.5), json!(0.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
        assert_eq!(number_value(f64::INFINITY), Value::Null);
    }

    #[test]
    fn format_js_number_matches_javascript_spelling() {
        assert_eq!(format_js_number(3.0), "3");
        assert_eq!(format_js_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_js_number(1e21), "1e+21");
        assert_eq!(format_js_number(1e-7), "1e-7");
        assert_eq!(format_js_number(-0.0), "0");
        assert_eq!(format_js_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn format_template_value_renders_primitives_and_containers() {
        assert_eq!(format_template_value(Some(&json!(null))), "null");
        assert_eq!(format_template_value(Some(&json!(true))), "true");
        assert_eq!(format_template_value(Some(&json!([1, "a"]))), r#"[1,"a"]"#);
    }
}
