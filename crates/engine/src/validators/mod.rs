//! Per-widget property validation and parsing.
//!
//! Validators are keyed by `(entity type, property name)`. After a pass has
//! evaluated every binding, [`apply_validators`] coerces each registered
//! property into the type its widget declares and collects the failures into
//! a [`ValidationReport`]. Failures never stop sibling properties.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rebind_types::{DataTree, Entity, ValidationOutcome, ValidationRule, validate_value};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub mod config;

pub use config::{VALIDATORS_PATH_ENV, ValidatorConfig, ValidatorConfigError, default_validators_path, load_validator_config};

/// Checks one property value and produces its parsed form.
pub trait PropertyValidator: Send + Sync {
    fn validate(&self, value: &Value) -> ValidationOutcome;
}

impl PropertyValidator for ValidationRule {
    fn validate(&self, value: &Value) -> ValidationOutcome {
        validate_value(value, self)
    }
}

impl<F> PropertyValidator for F
where
    F: Fn(&Value) -> ValidationOutcome + Send + Sync,
{
    fn validate(&self, value: &Value) -> ValidationOutcome {
        self(value)
    }
}

/// Validators grouped by entity type, then by property name.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: BTreeMap<String, BTreeMap<String, Arc<dyn PropertyValidator>>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a validator, replacing any previous one for the same key.
    pub fn register(
        &mut self,
        entity_type: impl Into<String>,
        property: impl Into<String>,
        validator: impl PropertyValidator + 'static,
    ) -> &mut Self {
        self.validators
            .entry(entity_type.into())
            .or_default()
            .insert(property.into(), Arc::new(validator));
        self
    }

    pub fn register_rule(&mut self, entity_type: impl Into<String>, property: impl Into<String>, rule: ValidationRule) -> &mut Self {
        self.register(entity_type, property, rule)
    }

    pub fn get(&self, entity_type: &str, property: &str) -> Option<&Arc<dyn PropertyValidator>> {
        self.validators.get(entity_type)?.get(property)
    }

    /// Validators registered for one entity type, in property order.
    pub fn for_type(&self, entity_type: &str) -> impl Iterator<Item = (&String, &Arc<dyn PropertyValidator>)> {
        self.validators.get(entity_type).into_iter().flatten()
    }

    /// Total number of registered `(type, property)` pairs.
    pub fn len(&self) -> usize {
        self.validators.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        let mut registry = Self::new();
        for (entity_type, properties) in &config.widgets {
            for (property, rule) in properties {
                registry.register_rule(entity_type.clone(), property.clone(), rule.clone());
            }
        }
        registry
    }

    /// Validates `value` for the given key; `None` when no validator is registered.
    pub fn validate_property(&self, entity_type: &str, property: &str, value: &Value) -> Option<ValidationOutcome> {
        self.get(entity_type, property).map(|validator| validator.validate(value))
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: BTreeMap<&String, Vec<&String>> = self
            .validators
            .iter()
            .map(|(entity_type, properties)| (entity_type, properties.keys().collect()))
            .collect();
        f.debug_struct("ValidatorRegistry").field("validators", &keys).finish()
    }
}

/// Validation state of one entity, in the shape widgets consume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityValidation {
    /// `true` for every property that failed validation.
    pub invalid_props: BTreeMap<String, bool>,
    /// First message reported for each invalid property.
    pub validation_messages: BTreeMap<String, String>,
}

impl EntityValidation {
    pub fn is_valid(&self) -> bool {
        self.invalid_props.is_empty()
    }

    fn record(&mut self, property: &str, outcome: &ValidationOutcome) {
        if outcome.is_valid {
            return;
        }
        self.invalid_props.insert(property.to_string(), true);
        let message = outcome.messages.first().cloned().unwrap_or_default();
        self.validation_messages.insert(property.to_string(), message);
    }
}

/// Validation state per entity name. Only entities with a registered
/// validator appear.
pub type ValidationReport = BTreeMap<String, EntityValidation>;

/// Validates every registered property of `entity` without changing it.
///
/// Properties the entity does not carry are skipped.
pub fn enhance_with_validations(entity: &Entity, registry: &ValidatorRegistry) -> Option<EntityValidation> {
    let entity_type = entity.kind.declared_type()?;
    let mut validation = EntityValidation::default();
    let mut checked = false;
    for (property, validator) in registry.for_type(entity_type) {
        let Some(value) = entity.properties.get(property) else {
            continue;
        };
        checked = true;
        validation.record(property, &validator.validate(value));
    }
    checked.then_some(validation)
}

/// Replaces every registered property with its parsed value and returns the
/// validation report.
pub fn apply_validators(tree: &mut DataTree, registry: &ValidatorRegistry) -> ValidationReport {
    let mut report = ValidationReport::new();
    for (name, entity) in tree.iter_mut() {
        let Some(entity_type) = entity.kind.declared_type().map(str::to_string) else {
            continue;
        };
        let mut validation = EntityValidation::default();
        let mut checked = false;
        for (property, validator) in registry.for_type(&entity_type) {
            let Some(value) = entity.properties.get_mut(property) else {
                continue;
            };
            checked = true;
            let outcome = validator.validate(value);
            if outcome.is_valid {
                debug!(entity = %name, property = %property, "property validated");
            } else {
                warn!(
                    entity = %name,
                    property = %property,
                    messages = ?outcome.messages,
                    "property failed validation; using fallback value"
                );
            }
            validation.record(property, &outcome);
            *value = outcome.parsed;
        }
        if checked {
            report.insert(name.clone(), validation);
        }
    }
    report
}

/// Returns a copy of `tree` with every registered property replaced by its
/// parsed value.
pub fn get_parsed_tree(tree: &DataTree, registry: &ValidatorRegistry) -> DataTree {
    let mut parsed = tree.clone();
    apply_validators(&mut parsed, registry);
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebind_types::ValidationType;
    use serde_json::json;

    fn registry() -> ValidatorRegistry {
        let mut registry = ValidatorRegistry::new();
        registry
            .register_rule("INPUT_WIDGET", "text", ValidationType::Text.into())
            .register_rule("SWITCH_WIDGET", "isOn", ValidationType::Boolean.into())
            .register_rule("TABLE_WIDGET", "tableData", ValidationType::ObjectArray.into());
        registry
    }

    fn tree() -> DataTree {
        serde_json::from_value(json!({
            "Input1": {"type": "INPUT_WIDGET", "text": 42},
            "Switch1": {"type": "SWITCH_WIDGET", "isOn": "true"},
            "Table1": {"type": "TABLE_WIDGET", "tableData": "not rows"},
            "fetchUsers": {"type": "ACTION", "data": "x"}
        }))
        .expect("tree")
    }

    #[test]
    fn registry_lookups_are_keyed_by_type_and_property() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("INPUT_WIDGET", "text").is_some());
        assert!(registry.get("INPUT_WIDGET", "label").is_none());
        assert!(registry.validate_property("BUTTON_WIDGET", "text", &json!("x")).is_none());
        let outcome = registry.validate_property("SWITCH_WIDGET", "isOn", &json!("false")).expect("registered");
        assert_eq!(outcome.parsed, json!(false));
    }

    #[test]
    fn apply_validators_parses_values_and_reports_failures() {
        let mut tree = tree();
        let report = apply_validators(&mut tree, &registry());

        assert_eq!(tree.get_path("Input1.text").as_deref(), Some(&json!("42")));
        assert_eq!(tree.get_path("Switch1.isOn").as_deref(), Some(&json!(true)));
        assert_eq!(tree.get_path("Table1.tableData").as_deref(), Some(&json!([])));
        assert_eq!(tree.get_path("fetchUsers.data").as_deref(), Some(&json!("x")));

        assert!(report["Input1"].is_valid());
        assert!(report["Switch1"].is_valid());
        assert_eq!(report["Table1"].invalid_props.get("tableData"), Some(&true));
        assert!(report["Table1"].validation_messages["tableData"].contains("array of objects"));
        assert!(!report.contains_key("fetchUsers"));
    }

    #[test]
    fn enhance_with_validations_leaves_the_entity_untouched() {
        let tree = tree();
        let table = tree.get("Table1").expect("table");
        let validation = enhance_with_validations(table, &registry()).expect("validated");
        assert!(!validation.is_valid());
        assert_eq!(table.properties["tableData"], json!("not rows"));
        assert!(enhance_with_validations(tree.get("fetchUsers").expect("action"), &registry()).is_none());

        let serialized = serde_json::to_value(&validation).expect("serialize");
        assert_eq!(serialized["invalidProps"], json!({"tableData": true}));
    }

    #[test]
    fn closures_act_as_validators() {
        let mut registry = ValidatorRegistry::new();
        registry.register("INPUT_WIDGET", "text", |value: &Value| {
            if value.as_str().is_some_and(|text| text.len() <= 3) {
                ValidationOutcome::valid(value.clone())
            } else {
                ValidationOutcome::invalid(json!(""), "too long")
            }
        });

        let parsed = get_parsed_tree(&tree(), &registry);
        assert_eq!(parsed.get_path("Input1.text").as_deref(), Some(&json!("")));
        assert!(format!("{registry:?}").contains("INPUT_WIDGET"));
    }
}
