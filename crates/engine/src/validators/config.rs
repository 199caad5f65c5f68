//! Validator rules loaded from a YAML (or JSON) document.
//!
//! ```yaml
//! widgets:
//!   INPUT_WIDGET:
//!     text: { type: TEXT, max_length: 40 }
//!   TABLE_WIDGET:
//!     tableData: { type: OBJECT_ARRAY }
//! ```
//!
//! The document is looked up from an explicit path, then
//! [`VALIDATORS_PATH_ENV`], then `<config_dir>/rebind/validators.yaml`.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use rebind_types::ValidationRule;
use rebind_util::expand_tilde;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::ValidatorRegistry;

/// Environment variable overriding the validator rules file path.
pub const VALIDATORS_PATH_ENV: &str = "REBIND_VALIDATORS_PATH";

/// Default filename inside the rebind configuration directory.
pub const VALIDATORS_FILE_NAME: &str = "validators.yaml";

#[derive(Debug, Error)]
pub enum ValidatorConfigError {
    #[error("failed to read validator rules from {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse validator rules in {}: {source}", path.display())]
    Parse { path: PathBuf, source: serde_yaml::Error },
}

/// Rules keyed by entity type, then property name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub widgets: BTreeMap<String, BTreeMap<String, ValidationRule>>,
}

impl ValidatorConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ValidatorConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ValidatorConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text).map_err(|source| ValidatorConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.widgets.values().map(BTreeMap::len).sum()
    }

    pub fn into_registry(self) -> ValidatorRegistry {
        ValidatorRegistry::from_config(&self)
    }
}

/// `<config_dir>/rebind/validators.yaml`.
pub fn default_validators_path() -> PathBuf {
    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("rebind").join(VALIDATORS_FILE_NAME)
}

fn env_validators_path() -> Option<PathBuf> {
    let path = env::var(VALIDATORS_PATH_ENV).ok()?;
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(expand_tilde(trimmed))
}

/// Loads validator rules, resolving the document location by priority.
///
/// An explicit path or an environment override must exist. The default
/// location is optional: when it is missing no rules are loaded.
pub fn load_validator_config(explicit: Option<&Path>) -> Result<ValidatorConfig, ValidatorConfigError> {
    if let Some(path) = explicit {
        return ValidatorConfig::load(&expand_tilde(&path.to_string_lossy()));
    }
    if let Some(path) = env_validators_path() {
        debug!(path = %path.display(), "loading validator rules from environment override");
        return ValidatorConfig::load(&path);
    }

    let path = default_validators_path();
    match ValidatorConfig::load(&path) {
        Err(ValidatorConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no validator rules file; continuing without validators");
            Ok(ValidatorConfig::default())
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebind_types::ValidationType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const RULES: &str = r#"
widgets:
  INPUT_WIDGET:
    text: { type: TEXT, max_length: 3 }
  SWITCH_WIDGET:
    isOn: { type: BOOLEAN, default: false }
"#;

    fn rules_file(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(text.as_bytes()).expect("write rules");
        file
    }

    #[test]
    fn parses_rules_document() {
        let config = ValidatorConfig::from_yaml_str(RULES).expect("parse");
        assert_eq!(config.rule_count(), 2);
        let text = &config.widgets["INPUT_WIDGET"]["text"];
        assert_eq!(text.kind, ValidationType::Text);
        assert_eq!(text.max_length, Some(3));

        let registry = config.into_registry();
        assert!(registry.get("SWITCH_WIDGET", "isOn").is_some());
    }

    #[test]
    fn json_documents_load_too() {
        let config = ValidatorConfig::from_yaml_str(r#"{"widgets": {"TABLE_WIDGET": {"tableData": {"type": "ARRAY"}}}}"#).expect("parse");
        assert_eq!(config.widgets["TABLE_WIDGET"]["tableData"].kind, ValidationType::Array);
        assert_eq!(ValidatorConfig::from_yaml_str("  ").expect("empty"), ValidatorConfig::default());
    }

    #[test]
    fn explicit_path_wins_over_environment() {
        let explicit = rules_file(RULES);
        let other = rules_file("widgets: {}");
        let other_path = other.path().to_string_lossy().to_string();
        temp_env::with_var(VALIDATORS_PATH_ENV, Some(other_path.as_str()), || {
            let config = load_validator_config(Some(explicit.path())).expect("load");
            assert_eq!(config.rule_count(), 2);
        });
    }

    #[test]
    fn environment_override_is_used_and_must_exist() {
        let file = rules_file(RULES);
        let path = file.path().to_string_lossy().to_string();
        temp_env::with_var(VALIDATORS_PATH_ENV, Some(format!("  {path}  ")), || {
            assert_eq!(load_validator_config(None).expect("load").rule_count(), 2);
        });

        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("missing.yaml");
        temp_env::with_var(VALIDATORS_PATH_ENV, Some(missing.as_os_str()), || {
            let error = load_validator_config(None).expect_err("missing override");
            assert!(matches!(error, ValidatorConfigError::Read { .. }));
        });
    }

    #[test]
    fn malformed_rules_report_the_path() {
        let file = rules_file("widgets: [1, 2");
        let error = ValidatorConfig::load(file.path()).expect_err("malformed");
        assert!(matches!(error, ValidatorConfigError::Parse { .. }));
        assert!(error.to_string().contains(&file.path().display().to_string()));
    }
}
