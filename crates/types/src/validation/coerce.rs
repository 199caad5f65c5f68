//! Coercion of evaluated values into declared property types.
//!
//! Coercion is lenient in the directions a binding commonly produces: numbers
//! and booleans typed into text fields arrive as strings, and object or array
//! data bound from another widget may arrive as serialized JSON. Anything that
//! cannot be coerced is reported invalid and replaced by the rule's default.

use regex::Regex;
use rebind_util::{format_template_value, number_value};
use serde_json::{Map, Value};

use super::{ValidationOutcome, ValidationRule, ValidationType};

/// Validate a value against a rule, returning the coerced value and messages.
///
/// The type check runs first. Constraint checks (`enum`, `pattern`, lengths,
/// bounds) only run on values that coerced successfully, and a failing
/// constraint falls back to the rule's default like a type mismatch does.
pub fn validate_value(value: &Value, rule: &ValidationRule) -> ValidationOutcome {
    if value.is_null() {
        if rule.required {
            return ValidationOutcome::invalid(fallback(rule), "value is required");
        }
        return ValidationOutcome::valid(rule.default.clone().unwrap_or(Value::Null));
    }

    let parsed = match coerce(value, rule.kind) {
        Ok(parsed) => parsed,
        Err(message) => return ValidationOutcome::invalid(fallback(rule), message),
    };

    match check_constraints(&parsed, rule) {
        Ok(()) => ValidationOutcome::valid(parsed),
        Err(message) => ValidationOutcome::invalid(fallback(rule), message),
    }
}

fn fallback(rule: &ValidationRule) -> Value {
    if let Some(default) = &rule.default {
        return default.clone();
    }
    match rule.kind {
        ValidationType::Text => Value::String(String::new()),
        ValidationType::Boolean => Value::Bool(false),
        ValidationType::Object => Value::Object(Map::new()),
        ValidationType::Array | ValidationType::ObjectArray => Value::Array(Vec::new()),
        ValidationType::Number | ValidationType::Any => Value::Null,
    }
}

fn type_mismatch(kind: ValidationType) -> String {
    format!("value does not evaluate to type: {}", kind.describe())
}

fn coerce(value: &Value, kind: ValidationType) -> Result<Value, String> {
    match kind {
        ValidationType::Any => Ok(value.clone()),
        ValidationType::Text => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(_) | Value::Bool(_) => Ok(Value::String(format_template_value(Some(value)))),
            _ => Err(type_mismatch(kind)),
        },
        ValidationType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .map(number_value)
                .ok_or_else(|| type_mismatch(kind)),
            _ => Err(type_mismatch(kind)),
        },
        ValidationType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(text) => match text.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(type_mismatch(kind)),
            },
            _ => Err(type_mismatch(kind)),
        },
        ValidationType::Object => match parse_json_text(value) {
            Some(parsed @ Value::Object(_)) => Ok(parsed),
            _ => Err(type_mismatch(kind)),
        },
        ValidationType::Array => match parse_json_text(value) {
            Some(parsed @ Value::Array(_)) => Ok(parsed),
            _ => Err(type_mismatch(kind)),
        },
        ValidationType::ObjectArray => match parse_json_text(value) {
            Some(Value::Array(items)) if items.iter().all(Value::is_object) => Ok(Value::Array(items)),
            _ => Err(type_mismatch(kind)),
        },
    }
}

/// Returns containers as-is and parses strings that hold serialized JSON.
fn parse_json_text(value: &Value) -> Option<Value> {
    match value {
        Value::String(text) => serde_json::from_str(text.trim()).ok(),
        other => Some(other.clone()),
    }
}

fn check_constraints(candidate: &Value, rule: &ValidationRule) -> Result<(), String> {
    if !rule.allowed_values.is_empty() && !rule.allowed_values.iter().any(|allowed| json_values_match(allowed, candidate)) {
        return Err("value is not in the allowed set".to_string());
    }

    match candidate {
        Value::String(text) => {
            if let Some(min_length) = rule.min_length
                && text.chars().count() < min_length
            {
                return Err(format!("value must be at least {} characters", min_length));
            }

            if let Some(max_length) = rule.max_length
                && text.chars().count() > max_length
            {
                return Err(format!("value must be at most {} characters", max_length));
            }

            if let Some(pattern) = &rule.pattern {
                let regex = Regex::new(pattern).map_err(|error| format!("invalid pattern '{}': {}", pattern, error))?;
                if !regex.is_match(text) {
                    return Err(format!("value must match the pattern {}", pattern));
                }
            }
            Ok(())
        }
        Value::Number(number) => {
            let number = number.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = rule.min
                && number < min
            {
                return Err(format!("value must be at least {}", min));
            }
            if let Some(max) = rule.max
                && number > max
            {
                return Err(format!("value must be at most {}", max));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn json_values_match(expected: &Value, candidate: &Value) -> bool {
    if expected == candidate {
        return true;
    }
    match (expected, candidate) {
        (Value::Number(expected_number), Value::Number(candidate_number)) => expected_number.as_f64() == candidate_number.as_f64(),
        (Value::String(expected_text), other) => expected_text == &format_template_value(Some(other)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_accepts_primitives_and_rejects_containers() {
        let rule = ValidationRule::new(ValidationType::Text);
        assert_eq!(validate_value(&json!("hi"), &rule), ValidationOutcome::valid(json!("hi")));
        assert_eq!(validate_value(&json!(42), &rule).parsed, json!("42"));
        assert_eq!(validate_value(&json!(true), &rule).parsed, json!("true"));

        let outcome = validate_value(&json!({"a": 1}), &rule);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.parsed, json!(""));
        assert_eq!(outcome.messages, vec!["value does not evaluate to type: string"]);
    }

    #[test]
    fn number_parses_numeric_text_and_checks_bounds() {
        let mut rule = ValidationRule::new(ValidationType::Number);
        rule.max = Some(10.0);
        assert_eq!(validate_value(&json!(" 7 "), &rule).parsed, json!(7));
        assert_eq!(validate_value(&json!(2.5), &rule).parsed, json!(2.5));

        let too_large = validate_value(&json!(11), &rule);
        assert!(!too_large.is_valid);
        assert_eq!(too_large.parsed, Value::Null);

        assert!(!validate_value(&json!("seven"), &rule).is_valid);
    }

    #[test]
    fn boolean_accepts_textual_flags() {
        let mut rule = ValidationRule::new(ValidationType::Boolean);
        assert_eq!(validate_value(&json!("true"), &rule).parsed, json!(true));
        rule.default = Some(json!(true));
        let outcome = validate_value(&json!("yes"), &rule);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.parsed, json!(true));
    }

    #[test]
    fn containers_parse_serialized_json() {
        let object_rule = ValidationRule::new(ValidationType::Object);
        assert_eq!(validate_value(&json!(r#"{"a":1}"#), &object_rule).parsed, json!({"a": 1}));
        assert!(!validate_value(&json!("[1]"), &object_rule).is_valid);

        let rows_rule = ValidationRule::new(ValidationType::ObjectArray);
        assert!(validate_value(&json!([{"id": 1}]), &rows_rule).is_valid);
        let outcome = validate_value(&json!([1, 2]), &rows_rule);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.parsed, json!([]));
    }

    #[test]
    fn null_respects_required_flag() {
        let mut rule = ValidationRule::new(ValidationType::Text);
        assert!(validate_value(&Value::Null, &rule).is_valid);
        rule.required = true;
        let outcome = validate_value(&Value::Null, &rule);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.messages, vec!["value is required"]);
    }

    #[test]
    fn constraints_apply_after_coercion() {
        let mut rule = ValidationRule::new(ValidationType::Text);
        rule.allowed_values = vec![json!("1"), json!("2")];
        assert!(validate_value(&json!(2), &rule).is_valid);
        assert!(!validate_value(&json!(3), &rule).is_valid);

        let mut pattern_rule = ValidationRule::new(ValidationType::Text);
        pattern_rule.pattern = Some("^[a-z]+$".into());
        pattern_rule.max_length = Some(4);
        assert!(validate_value(&json!("abc"), &pattern_rule).is_valid);
        assert!(!validate_value(&json!("ABC"), &pattern_rule).is_valid);
        assert!(!validate_value(&json!("abcde"), &pattern_rule).is_valid);
    }
}
