//! Declarative property validation rules.
//!
//! After a pass evaluates bindings, each widget property can be checked and
//! coerced into the type the widget declares for it (a switch expects a
//! boolean, a table expects an array of rows). Rules are keyed externally by
//! `(entity type, property name)`; this module only defines a rule and what
//! applying it produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod coerce;

pub use coerce::validate_value;

/// Target type a property value is coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationType {
    Text,
    Number,
    Boolean,
    Object,
    Array,
    ObjectArray,
    Any,
}

impl ValidationType {
    /// Human-readable name used in validation messages.
    pub fn describe(&self) -> &'static str {
        match self {
            ValidationType::Text => "string",
            ValidationType::Number => "number",
            ValidationType::Boolean => "boolean",
            ValidationType::Object => "object",
            ValidationType::Array => "array",
            ValidationType::ObjectArray => "array of objects",
            ValidationType::Any => "any",
        }
    }
}

/// Declarative rule for one widget property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Type the value must evaluate to.
    #[serde(rename = "type")]
    pub kind: ValidationType,
    /// Value used as the parsed result when validation fails.
    #[serde(default)]
    pub default: Option<Value>,
    /// Whether `null` is rejected.
    #[serde(default)]
    pub required: bool,
    /// Enumerated set of allowed values, if constrained.
    #[serde(rename = "enum")]
    #[serde(default)]
    pub allowed_values: Vec<Value>,
    /// Regular expression text values must match, when provided.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Minimum length for text values.
    #[serde(default)]
    pub min_length: Option<usize>,
    /// Maximum length for text values.
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Inclusive lower bound for numbers.
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper bound for numbers.
    #[serde(default)]
    pub max: Option<f64>,
}

impl ValidationRule {
    pub fn new(kind: ValidationType) -> Self {
        Self {
            kind,
            default: None,
            required: false,
            allowed_values: Vec::new(),
            pattern: None,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
        }
    }
}

impl From<ValidationType> for ValidationRule {
    fn from(kind: ValidationType) -> Self {
        Self::new(kind)
    }
}

/// Result of validating and coercing one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    /// Coerced value; the rule's fallback when the value was invalid.
    pub parsed: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl ValidationOutcome {
    pub fn valid(parsed: Value) -> Self {
        Self {
            is_valid: true,
            parsed,
            messages: Vec::new(),
        }
    }

    pub fn invalid(parsed: Value, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            parsed,
            messages: vec![message.into()],
        }
    }
}
