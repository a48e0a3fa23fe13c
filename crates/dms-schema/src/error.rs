//! # Schema Error Types
//!
//! Structured errors for schema registration, lookup, validation, and
//! field-level encryption.

use dms_core::{SchemaCode, SchemaVersion, StoreError};
use dms_crypto::CipherError;
use thiserror::Error;

use crate::validate::ValidationViolations;

/// Errors from the registry and the field security processor.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// No schema row for the code (or the pinned version), or no active row
    /// when resolving "latest".
    #[error("schema not found: {code}{}", .version.map(|v| format!(" {v}")).unwrap_or_default())]
    SchemaNotFound {
        /// Requested schema code.
        code: SchemaCode,
        /// Requested version; `None` means "latest active".
        version: Option<SchemaVersion>,
    },

    /// The definition is not a valid JSON Schema, carries malformed
    /// `x-encrypt` / `x-security` annotations, or has a malformed migration
    /// script.
    #[error("invalid schema definition for {code}: {reason}")]
    InvalidSchemaDefinition {
        /// Schema code being registered or compiled.
        code: SchemaCode,
        /// Compiler or annotation error text.
        reason: String,
    },

    /// A document does not conform to the schema.
    #[error("validation failed for {code} {version}: {violations}")]
    ValidationFailed {
        /// Schema code validated against.
        code: SchemaCode,
        /// Schema version validated against.
        version: SchemaVersion,
        /// Every failing location.
        violations: ValidationViolations,
    },

    /// An `x-encrypt` field could not be encrypted. The write is refused
    /// rather than persisting plaintext.
    #[error("cannot encrypt field '{field}': {source}")]
    Encryption {
        /// Property name at the level where encryption failed.
        field: String,
        /// Underlying cipher error.
        #[source]
        source: CipherError,
    },

    /// The schema store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchemaError {
    pub(crate) fn not_found(code: &SchemaCode, version: Option<SchemaVersion>) -> Self {
        Self::SchemaNotFound {
            code: code.clone(),
            version,
        }
    }

    pub(crate) fn invalid(code: &SchemaCode, reason: impl Into<String>) -> Self {
        Self::InvalidSchemaDefinition {
            code: code.clone(),
            reason: reason.into(),
        }
    }

    /// The structured violations of a [`SchemaError::ValidationFailed`].
    pub fn violations(&self) -> Option<&ValidationViolations> {
        match self {
            Self::ValidationFailed { violations, .. } => Some(violations),
            _ => None,
        }
    }
}
