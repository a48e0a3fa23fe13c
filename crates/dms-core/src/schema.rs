//! # Schema Definitions
//!
//! The persisted shape of a versioned schema and the declarative payloads
//! attached to it: migration scripts and virtual column configs.
//!
//! ## Lifecycle
//!
//! A code's first registration creates version 1. Each further registration
//! inserts `max(version) + 1` with the new definition; older rows are kept
//! so migration history stays resolvable from any past version. Rows are
//! never deleted, only deactivated. "Latest" is the highest version among
//! active rows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identity::{JsonPath, SchemaCode, SchemaVersion, SqlIdentifier};

// ─── SchemaDefinition ───────────────────────────────────────────────

/// One stored version of a schema family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    /// Store-assigned row id.
    pub id: i64,
    /// Logical schema family name.
    pub code: SchemaCode,
    /// Version within the family.
    pub version: SchemaVersion,
    /// Business table whose `details` column this schema governs.
    pub table_name: Option<SqlIdentifier>,
    /// The JSON-Schema document, including `x-encrypt` / `x-security`
    /// annotations.
    pub definition: Value,
    /// Steps that upgrade a document from the previous version to this one.
    pub migration_script: Option<MigrationScript>,
    /// Generated columns to project out of `details`.
    #[serde(default)]
    pub virtual_columns: Vec<VirtualColumnConfig>,
    /// Inactive rows are skipped when resolving "latest".
    pub is_active: bool,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
    /// When the row was last modified (activation toggles).
    pub updated_at: DateTime<Utc>,
}

/// Authoring input for a new schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSchema {
    /// Logical schema family name.
    pub code: SchemaCode,
    /// The JSON-Schema document.
    pub definition: Value,
    /// Business table governed by this schema.
    #[serde(default)]
    pub table_name: Option<SqlIdentifier>,
    /// Upgrade steps from the previous version.
    #[serde(default)]
    pub migration_script: Option<MigrationScript>,
    /// Generated columns to project.
    #[serde(default)]
    pub virtual_columns: Vec<VirtualColumnConfig>,
}

impl NewSchema {
    /// A bare definition with no table, script, or virtual columns.
    pub fn new(code: SchemaCode, definition: Value) -> Self {
        Self {
            code,
            definition,
            table_name: None,
            migration_script: None,
            virtual_columns: Vec::new(),
        }
    }

    /// Attach the governed table.
    pub fn with_table(mut self, table: SqlIdentifier) -> Self {
        self.table_name = Some(table);
        self
    }

    /// Attach a migration script.
    pub fn with_migration_script(mut self, script: MigrationScript) -> Self {
        self.migration_script = Some(script);
        self
    }

    /// Attach virtual column configs.
    pub fn with_virtual_columns(mut self, columns: Vec<VirtualColumnConfig>) -> Self {
        self.virtual_columns = columns;
        self
    }
}

/// Listing filter for stored schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaFilter {
    /// Case-insensitive substring match on the code.
    pub code_contains: Option<String>,
    /// Restrict to active (`Some(true)`) or inactive (`Some(false)`) rows.
    pub active: Option<bool>,
}

impl SchemaFilter {
    /// Whether a stored schema passes this filter.
    pub fn matches(&self, schema: &SchemaDefinition) -> bool {
        if let Some(active) = self.active {
            if schema.is_active != active {
                return false;
            }
        }
        match &self.code_contains {
            Some(needle) => schema
                .code
                .as_str()
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
            None => true,
        }
    }
}

// ─── Migration scripts ──────────────────────────────────────────────

/// Ordered list of declarative upgrade steps, stored as `{"steps": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationScript {
    /// Steps applied in list order.
    #[serde(default)]
    pub steps: Vec<MigrationStep>,
}

impl MigrationScript {
    /// Build a script from steps.
    pub fn new(steps: Vec<MigrationStep>) -> Self {
        Self { steps }
    }
}

/// One declarative transformation. `config` is free-form; its expected
/// keys depend on `step_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Step kind, e.g. `FIELD_RENAME`.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Step parameters.
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl MigrationStep {
    /// Build a step from a kind and a JSON object of parameters. Non-object
    /// `config` values are treated as empty.
    pub fn new(step_type: StepType, config: Value) -> Self {
        let config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { step_type, config }
    }

    /// `FIELD_RENAME` from `old_field` to `new_field`.
    pub fn rename(old_field: &str, new_field: &str) -> Self {
        Self::new(
            StepType::FieldRename,
            serde_json::json!({ "old_field": old_field, "new_field": new_field }),
        )
    }

    /// `FIELD_ADD` of `field` with `default_value`.
    pub fn add(field: &str, default_value: Value) -> Self {
        Self::new(
            StepType::FieldAdd,
            serde_json::json!({ "field": field, "default_value": default_value }),
        )
    }

    /// `FIELD_REMOVE` of `field`.
    pub fn remove(field: &str) -> Self {
        Self::new(StepType::FieldRemove, serde_json::json!({ "field": field }))
    }

    /// String-valued config entry.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// Migration step kinds. Unrecognized kinds are kept verbatim so they can be
/// reported and skipped instead of failing to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    /// Move a value to a new key.
    FieldRename,
    /// Add a key with a default if absent.
    FieldAdd,
    /// Delete a key.
    FieldRemove,
    /// Rewrite a value in place.
    FieldTransform,
    /// Reserved for structural rewrites; not interpreted.
    StructureChange,
    /// Any other step type string.
    Unknown(String),
}

impl StepType {
    /// Canonical wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::FieldRename => "FIELD_RENAME",
            Self::FieldAdd => "FIELD_ADD",
            Self::FieldRemove => "FIELD_REMOVE",
            Self::FieldTransform => "FIELD_TRANSFORM",
            Self::StructureChange => "STRUCTURE_CHANGE",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for StepType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "FIELD_RENAME" => Self::FieldRename,
            "FIELD_ADD" => Self::FieldAdd,
            "FIELD_REMOVE" => Self::FieldRemove,
            "FIELD_TRANSFORM" => Self::FieldTransform,
            "STRUCTURE_CHANGE" => Self::StructureChange,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<StepType> for String {
    fn from(step: StepType) -> Self {
        step.as_str().to_string()
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Virtual columns ────────────────────────────────────────────────

/// A JSON path in `details` exposed as a generated column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualColumnConfig {
    /// Generated column name.
    pub column_name: SqlIdentifier,
    /// Path into the `details` column.
    pub json_path: JsonPath,
    /// Logical column type.
    pub data_type: ColumnDataType,
    /// Optional index over the generated column.
    #[serde(default)]
    pub index_type: Option<IndexType>,
    /// Whether documents are expected to always populate the path.
    #[serde(default)]
    pub is_required: bool,
}

/// Logical data type of a virtual column. Unknown type names are kept and
/// fall back to a generic string column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnDataType {
    /// Integer.
    Int,
    /// Bounded string.
    Varchar,
    /// Boolean flag.
    Boolean,
    /// Calendar date.
    Date,
    /// Date and time.
    Datetime,
    /// Fixed-point decimal.
    Decimal,
    /// Any other type name.
    Other(String),
}

impl ColumnDataType {
    /// Canonical wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Int => "INT",
            Self::Varchar => "VARCHAR",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Datetime => "DATETIME",
            Self::Decimal => "DECIMAL",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for ColumnDataType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "INT" => Self::Int,
            "VARCHAR" => Self::Varchar,
            "BOOLEAN" => Self::Boolean,
            "DATE" => Self::Date,
            "DATETIME" => Self::Datetime,
            "DECIMAL" => Self::Decimal,
            _ => Self::Other(raw),
        }
    }
}

impl From<ColumnDataType> for String {
    fn from(ty: ColumnDataType) -> Self {
        ty.as_str().to_string()
    }
}

/// Index requested over a virtual column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexType {
    /// No index.
    None,
    /// Plain secondary index.
    Index,
    /// Unique index.
    Unique,
    /// Full-text index.
    Fulltext,
}

impl IndexType {
    /// Whether an index should be created at all.
    pub fn wants_index(self) -> bool {
        !matches!(self, Self::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_type_round_trips_known_and_unknown() {
        let steps: Vec<MigrationStep> = serde_json::from_value(json!([
            {"type": "FIELD_RENAME", "config": {"old_field": "a", "new_field": "b"}},
            {"type": "SPLIT_FIELD", "config": {}}
        ]))
        .unwrap();
        assert_eq!(steps[0].step_type, StepType::FieldRename);
        assert_eq!(steps[1].step_type, StepType::Unknown("SPLIT_FIELD".into()));
        assert_eq!(serde_json::to_value(&steps[1]).unwrap()["type"], "SPLIT_FIELD");
    }

    #[test]
    fn step_without_config_defaults_to_empty() {
        let step: MigrationStep =
            serde_json::from_value(json!({"type": "STRUCTURE_CHANGE"})).unwrap();
        assert!(step.config.is_empty());
    }

    #[test]
    fn migration_script_shape() {
        let script: MigrationScript = serde_json::from_value(json!({
            "steps": [{"type": "FIELD_REMOVE", "config": {"field": "legacy"}}]
        }))
        .unwrap();
        assert_eq!(script.steps.len(), 1);
        assert_eq!(script.steps[0].config_str("field"), Some("legacy"));
    }

    #[test]
    fn virtual_column_config_parses_with_fallback_type() {
        let cfg: VirtualColumnConfig = serde_json::from_value(json!({
            "column_name": "v_drawing_no",
            "json_path": "$.drawingNo",
            "data_type": "TEXT",
            "index_type": "UNIQUE"
        }))
        .unwrap();
        assert_eq!(cfg.data_type, ColumnDataType::Other("TEXT".into()));
        assert_eq!(cfg.index_type, Some(IndexType::Unique));
        assert!(!cfg.is_required);
    }

    #[test]
    fn virtual_column_config_rejects_unsafe_names() {
        let result = serde_json::from_value::<VirtualColumnConfig>(json!({
            "column_name": "x; DROP TABLE y",
            "json_path": "$.x",
            "data_type": "INT"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn filter_matches_code_and_activity() {
        let schema = SchemaDefinition {
            id: 1,
            code: SchemaCode::new("RFA_DWG_V1").unwrap(),
            version: SchemaVersion::FIRST,
            table_name: None,
            definition: json!({"type": "object"}),
            migration_script: None,
            virtual_columns: Vec::new(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(SchemaFilter::default().matches(&schema));
        let by_code = SchemaFilter {
            code_contains: Some("dwg".into()),
            active: None,
        };
        assert!(by_code.matches(&schema));
        let inactive_only = SchemaFilter {
            code_contains: None,
            active: Some(false),
        };
        assert!(!inactive_only.matches(&schema));
    }
}
