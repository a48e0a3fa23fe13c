//! # Migration Pipeline
//!
//! Upgrades one stored document from its recorded schema version to a
//! target version of the same schema code, applying each intermediate
//! version's migration script in order.
//!
//! ## Security Invariant
//!
//! A migration is all-or-nothing. The row is locked for the whole run and
//! is written only after the upgraded document validates against the target
//! version; any failure rolls the transaction back and leaves `details` and
//! `schema_version` untouched.

use std::sync::Arc;

use dms_core::{EntityRef, SchemaCode, SchemaDefinition, SchemaVersion};
use dms_schema::{SchemaError, SchemaRegistry, SchemaStore};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::MigrationError;
use crate::step::apply_step;
use crate::store::{DocumentStore, DocumentTransaction};

/// A migration step that was skipped or only partly applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationWarning {
    /// Schema version whose script contains the step.
    pub version: SchemaVersion,
    /// Position of the step in that script.
    pub step_index: usize,
    /// Step type as written.
    pub step_type: String,
    /// What went wrong.
    pub message: String,
}

/// Outcome of [`MigrationPipeline::migrate_data`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// Always true; failures are returned as errors.
    pub success: bool,
    /// Version recorded on the row before the run.
    pub from_version: SchemaVersion,
    /// Version recorded on the row after the run.
    pub to_version: SchemaVersion,
    /// Target fields of the applied steps, deduplicated in first-seen order.
    pub migrated_fields: Vec<String>,
    /// Steps that were skipped or only partly applied.
    pub warnings: Vec<MigrationWarning>,
}

impl MigrationResult {
    fn up_to_date(version: SchemaVersion) -> Self {
        Self {
            success: true,
            from_version: version,
            to_version: version,
            migrated_fields: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Whether the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.from_version == self.to_version
    }
}

enum Plan {
    UpToDate(SchemaVersion),
    Upgrade {
        details: Value,
        result: MigrationResult,
    },
}

/// Moves stored documents between versions of a schema code.
#[derive(Debug)]
pub struct MigrationPipeline<S, D> {
    registry: Arc<SchemaRegistry<S>>,
    documents: D,
}

impl<S: SchemaStore, D: DocumentStore> MigrationPipeline<S, D> {
    /// A pipeline resolving schemas through `registry` and rows through
    /// `documents`.
    pub fn new(registry: Arc<SchemaRegistry<S>>, documents: D) -> Self {
        Self {
            registry,
            documents,
        }
    }

    /// The schema registry.
    pub fn registry(&self) -> &SchemaRegistry<S> {
        &self.registry
    }

    /// Upgrade `entity` to `target_version` of `code`, or to the latest
    /// active version when `None`.
    ///
    /// A row already at or above the target is left alone and reported as a
    /// no-op with `from == to`.
    ///
    /// # Errors
    ///
    /// - [`MigrationError::Schema`] if the target or an intermediate version
    ///   does not exist.
    /// - [`MigrationError::EntityNotFound`] / [`MigrationError::MalformedDocument`]
    ///   for a missing row, non-object `details`, or a `schema_version` too
    ///   large to be a version.
    /// - [`MigrationError::MigrationValidationFailed`] if the upgraded
    ///   document does not satisfy the target version.
    /// - [`MigrationError::Store`] on persistence failure.
    pub async fn migrate_data(
        &self,
        entity: &EntityRef,
        code: &SchemaCode,
        target_version: Option<SchemaVersion>,
    ) -> Result<MigrationResult, MigrationError> {
        let mut tx = self.documents.begin().await?;

        let plan = match self.plan(&mut tx, entity, code, target_version).await {
            Ok(plan) => plan,
            Err(err) => return Err(abort(tx, entity, code, err).await),
        };

        match plan {
            Plan::UpToDate(version) => {
                tx.rollback().await?;
                tracing::debug!(entity = %entity, code = %code, version = %version, "document already at target version");
                Ok(MigrationResult::up_to_date(version))
            }
            Plan::Upgrade { details, result } => {
                if let Err(err) = tx.write_document(entity, &details, result.to_version).await {
                    return Err(abort(tx, entity, code, err.into()).await);
                }
                if let Err(err) = tx.commit().await {
                    tracing::error!(entity = %entity, code = %code, error = %err, "migration commit failed");
                    return Err(err.into());
                }
                tracing::info!(
                    entity = %entity,
                    code = %code,
                    from = %result.from_version,
                    to = %result.to_version,
                    fields = result.migrated_fields.len(),
                    warnings = result.warnings.len(),
                    "document migrated"
                );
                Ok(result)
            }
        }
    }

    async fn plan(
        &self,
        tx: &mut D::Tx,
        entity: &EntityRef,
        code: &SchemaCode,
        target_version: Option<SchemaVersion>,
    ) -> Result<Plan, MigrationError> {
        let target = match target_version {
            Some(v) => self.registry.find_one_by_code_and_version(code, v).await?,
            None => self.registry.find_latest_by_code(code).await?,
        };

        let stored = tx
            .lock_document(entity)
            .await?
            .ok_or_else(|| MigrationError::EntityNotFound {
                entity: entity.clone(),
            })?;

        let current = stored_version(entity, stored.schema_version)?;
        let mut doc = match stored.details {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(MigrationError::MalformedDocument {
                    entity: entity.clone(),
                    reason: format!("details must be a JSON object, found {}", json_kind(&other)),
                })
            }
        };

        if current >= target.version {
            return Ok(Plan::UpToDate(current));
        }

        let mut migrated_fields: Vec<String> = Vec::new();
        let mut warnings = Vec::new();
        for version in current.upgrade_path(target.version) {
            let schema = self.registry.find_one_by_code_and_version(code, version).await?;
            apply_script(&schema, &mut doc, &mut migrated_fields, &mut warnings);
        }

        let details = Value::Object(doc);
        match self
            .registry
            .validate_version(code, target.version, &details)
            .await
        {
            Ok(_) => {}
            Err(SchemaError::ValidationFailed {
                code,
                version,
                violations,
            }) => {
                return Err(MigrationError::MigrationValidationFailed {
                    entity: entity.clone(),
                    code,
                    version,
                    violations,
                })
            }
            Err(other) => return Err(other.into()),
        }

        Ok(Plan::Upgrade {
            details,
            result: MigrationResult {
                success: true,
                from_version: current,
                to_version: target.version,
                migrated_fields,
                warnings,
            },
        })
    }
}

fn apply_script(
    schema: &SchemaDefinition,
    doc: &mut Map<String, Value>,
    migrated_fields: &mut Vec<String>,
    warnings: &mut Vec<MigrationWarning>,
) {
    let Some(script) = &schema.migration_script else {
        return;
    };
    tracing::debug!(code = %schema.code, version = %schema.version, steps = script.steps.len(), "applying migration script");

    for (index, step) in script.steps.iter().enumerate() {
        let outcome = apply_step(step, doc);
        if let Some(field) = outcome.target_field {
            if !migrated_fields.contains(&field) {
                migrated_fields.push(field);
            }
        }
        if let Some(message) = outcome.warning {
            tracing::warn!(
                code = %schema.code,
                version = %schema.version,
                step = index,
                step_type = %step.step_type,
                "{message}"
            );
            warnings.push(MigrationWarning {
                version: schema.version,
                step_index: index,
                step_type: step.step_type.as_str().to_string(),
                message,
            });
        }
    }
}

async fn abort<T: DocumentTransaction>(
    tx: T,
    entity: &EntityRef,
    code: &SchemaCode,
    err: MigrationError,
) -> MigrationError {
    if let Err(rollback) = tx.rollback().await {
        tracing::warn!(entity = %entity, error = %rollback, "rollback failed");
    }
    tracing::error!(entity = %entity, code = %code, error = %err, "migration rolled back");
    err
}

/// Version recorded on a row. Absent and non-positive values count as the
/// first version; values beyond the version range are rejected.
fn stored_version(entity: &EntityRef, raw: Option<i64>) -> Result<SchemaVersion, MigrationError> {
    match raw {
        None => Ok(SchemaVersion::FIRST),
        Some(v) if v <= 0 => Ok(SchemaVersion::FIRST),
        Some(v) => SchemaVersion::new(v).map_err(|_| MigrationError::MalformedDocument {
            entity: entity.clone(),
            reason: format!("schema_version {v} is out of range"),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
