//! # Migration Error Types

use dms_core::{EntityRef, SchemaCode, SchemaVersion, StoreError};
use dms_schema::{SchemaError, ValidationViolations};
use thiserror::Error;

/// Errors from [`MigrationPipeline::migrate_data`](crate::MigrationPipeline::migrate_data).
///
/// Every variant implies the entity row was left unchanged.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Target or intermediate schema could not be resolved.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The entity row does not exist.
    #[error("entity {entity} not found")]
    EntityNotFound {
        /// The requested row.
        entity: EntityRef,
    },

    /// The stored `details` value is not a JSON object.
    #[error("entity {entity} has malformed details: {reason}")]
    MalformedDocument {
        /// The row whose payload is malformed.
        entity: EntityRef,
        /// What was found instead.
        reason: String,
    },

    /// The upgraded document does not satisfy the target schema.
    #[error("migrated data for {entity} does not match {code} {version}: {violations}")]
    MigrationValidationFailed {
        /// The row being migrated.
        entity: EntityRef,
        /// Target schema code.
        code: SchemaCode,
        /// Target schema version.
        version: SchemaVersion,
        /// Every failing location in the upgraded document.
        violations: ValidationViolations,
    },

    /// The document store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
