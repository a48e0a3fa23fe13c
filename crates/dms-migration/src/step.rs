//! # Migration Steps
//!
//! Pure application of one declarative [`MigrationStep`] to a document's
//! top-level object.
//!
//! ## Step Kinds
//!
//! | Type               | Config keys                        | Effect                                 |
//! |--------------------|------------------------------------|----------------------------------------|
//! | `FIELD_RENAME`     | `old_field`, `new_field`           | move the value if `old_field` exists   |
//! | `FIELD_ADD`        | `field`, `default_value` (opt.)    | set `default_value` if `field` absent  |
//! | `FIELD_REMOVE`     | `field`                            | delete `field` if present              |
//! | `FIELD_TRANSFORM`  | `field`, `transform`, `mapping`    | rewrite the value in place             |
//! | `STRUCTURE_CHANGE` | -                                  | not interpreted, reported as a warning |
//!
//! Steps never fail. Anything that cannot be applied leaves the document
//! unchanged and yields a warning for the pipeline to report.

use dms_core::{MigrationStep, StepType};
use serde_json::{Map, Number, Value};

/// What applying one step produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// The field the step declares as its target, recorded whether or not
    /// the document changed.
    pub target_field: Option<String>,
    /// Why the step was skipped or only partly applied.
    pub warning: Option<String>,
}

impl StepOutcome {
    fn target(field: &str) -> Self {
        Self {
            target_field: Some(field.to_string()),
            warning: None,
        }
    }

    fn skipped(warning: impl Into<String>) -> Self {
        Self {
            target_field: None,
            warning: Some(warning.into()),
        }
    }

    fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Apply `step` to `doc` in place.
pub fn apply_step(step: &MigrationStep, doc: &mut Map<String, Value>) -> StepOutcome {
    match &step.step_type {
        StepType::FieldRename => {
            let (Some(old), Some(new)) = (step.config_str("old_field"), step.config_str("new_field"))
            else {
                return StepOutcome::skipped("FIELD_RENAME requires old_field and new_field");
            };
            if let Some(value) = doc.remove(old) {
                doc.insert(new.to_string(), value);
            }
            StepOutcome::target(new)
        }
        StepType::FieldAdd => {
            let Some(field) = step.config_str("field") else {
                return StepOutcome::skipped("FIELD_ADD requires field");
            };
            // No `default_value` key leaves the field absent; an explicit
            // `null` default is written.
            if let Some(default) = step.config.get("default_value") {
                if !doc.contains_key(field) {
                    doc.insert(field.to_string(), default.clone());
                }
            }
            StepOutcome::target(field)
        }
        StepType::FieldRemove => {
            let Some(field) = step.config_str("field") else {
                return StepOutcome::skipped("FIELD_REMOVE requires field");
            };
            doc.remove(field);
            StepOutcome::target(field)
        }
        StepType::FieldTransform => {
            let Some(field) = step.config_str("field") else {
                return StepOutcome::skipped("FIELD_TRANSFORM requires field");
            };
            let outcome = StepOutcome::target(field);
            let Some(value) = doc.get_mut(field) else {
                return outcome;
            };
            match transform(step, value) {
                Ok(()) => outcome,
                Err(warning) => outcome.with_warning(warning),
            }
        }
        StepType::StructureChange => {
            StepOutcome::skipped("STRUCTURE_CHANGE steps are not interpreted")
        }
        StepType::Unknown(raw) => StepOutcome::skipped(format!("unknown step type '{raw}'")),
    }
}

fn transform(step: &MigrationStep, value: &mut Value) -> Result<(), String> {
    match step.config_str("transform") {
        Some("MAP_VALUES") => {
            let Some(Value::Object(mapping)) = step.config.get("mapping") else {
                return Err("MAP_VALUES requires a mapping object".to_string());
            };
            if let Some(mapped) = mapping.get(&string_form(value)) {
                *value = mapped.clone();
            }
            Ok(())
        }
        Some("TO_NUMBER") => match to_number(value) {
            Some(n) => {
                *value = Value::Number(n);
                Ok(())
            }
            None => {
                let original = std::mem::replace(value, Value::Null);
                Err(format!("TO_NUMBER cannot convert {original}; set to null"))
            }
        },
        Some("TO_STRING") => {
            if !value.is_string() {
                *value = Value::String(string_form(value));
            }
            Ok(())
        }
        Some(other) => Err(format!("unknown transform '{other}'")),
        None => Err("FIELD_TRANSFORM requires transform".to_string()),
    }
}

/// Text form of a JSON value: strings unquoted, everything else as JSON.
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::Null => Some(Number::from(0)),
        Value::Bool(b) => Some(Number::from(u8::from(*b))),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Some(Number::from(0));
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Some(Number::from(i));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(Number::from_f64)
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}
