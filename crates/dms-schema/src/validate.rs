//! # Schema Validation
//!
//! Compilation of stored schema definitions into `jsonschema` validators
//! and structured reporting of violations.
//!
//! The draft is taken from the definition's `$schema` keyword (draft 4, 6,
//! 7, 2019-09, or 2020-12); a definition without one is compiled as
//! Draft 2020-12.
//!
//! ## Security Invariant
//!
//! Schema validation is a trust boundary. Documents that fail validation
//! are rejected with one [`Violation`] per failing location, carrying the
//! instance path, the schema path, and a human-readable message.
//!
//! ## Reference Resolution
//!
//! Stored schemas are self-contained. Internal `$ref`s (`#/$defs/...`) are
//! resolved by the jsonschema crate natively; any external `$ref` is
//! refused by [`OfflineRetriever`] so compiling a schema never performs a
//! network request.

use std::fmt;

use jsonschema::{Retrieve, Uri, ValidationOptions, Validator};
use serde_json::Value;

/// Retriever that refuses every external reference.
struct OfflineRetriever;

impl Retrieve for OfflineRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Err(format!("external schema reference '{}' is not allowed", uri.as_str()).into())
    }
}

/// A single validation violation with structured context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON Pointer path to the violating location in the instance.
    pub instance_path: String,
    /// JSON Pointer path within the schema that triggered the error.
    pub schema_path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

/// Collection of validation violations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationViolations {
    violations: Vec<Violation>,
}

impl ValidationViolations {
    /// Wrap a list of violations.
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// Returns the number of violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Returns true if there are no violations.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns a slice of all violations.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// One `instancePath: message` line per violation.
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }

    /// Whether any violation's path or message mentions `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.violations
            .iter()
            .any(|v| v.instance_path.contains(needle) || v.message.contains(needle))
    }

    /// Consumes self and returns the inner Vec.
    pub fn into_inner(self) -> Vec<Violation> {
        self.violations
    }
}

impl fmt::Display for ValidationViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

fn build_options() -> ValidationOptions {
    let mut opts = jsonschema::options();
    opts.with_retriever(OfflineRetriever);
    opts
}

/// Compile a schema definition. The definition itself is checked against
/// the draft meta-schema; the returned string is the compiler's message.
pub fn compile_validator(definition: &Value) -> Result<Validator, String> {
    if !definition.is_object() {
        return Err("schema definition must be a JSON object".to_string());
    }
    build_options().build(definition).map_err(|e| e.to_string())
}

/// Run a compiled validator and collect every violation.
pub fn collect_violations(validator: &Validator, instance: &Value) -> ValidationViolations {
    let violations = validator
        .iter_errors(instance)
        .map(|e| Violation {
            instance_path: e.instance_path.to_string(),
            schema_path: e.schema_path.to_string(),
            message: e.to_string(),
        })
        .collect();
    ValidationViolations { violations }
}
