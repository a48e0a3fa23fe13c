//! # Error Types
//!
//! Errors shared across the workspace. Component-specific taxonomies
//! (`SchemaError`, `MigrationError`, `ProjectionError`, `CipherError`) live
//! in their own crates and wrap these where a store or identifier is involved.

use thiserror::Error;

/// A value could not be accepted as a domain identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// Schema code is empty, too long, or contains disallowed characters.
    #[error("invalid schema code '{value}': {reason}")]
    InvalidSchemaCode {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Schema versions start at 1.
    #[error("invalid schema version {0}: versions start at 1")]
    InvalidVersion(i64),

    /// Table, column, or index name is not a safe SQL identifier.
    #[error("invalid SQL identifier '{value}': {reason}")]
    InvalidSqlIdentifier {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// JSON path expression is not `$`-rooted or contains characters that
    /// would break out of a quoted SQL string literal.
    #[error("invalid JSON path '{value}': {reason}")]
    InvalidJsonPath {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Failure reported by a persistence collaborator (schema store, document
/// store, or DDL catalog).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing database rejected or failed the operation.
    #[error("database error during {operation}: {reason}")]
    Database {
        /// What the store was doing, e.g. `"insert schema version"`.
        operation: String,
        /// Driver error text.
        reason: String,
    },

    /// A unique key rejected the write, e.g. two writers racing for the same
    /// `(schema_code, version)`.
    #[error("conflict during {operation}: {reason}")]
    Conflict {
        /// What the store was doing.
        operation: String,
        /// Driver error text.
        reason: String,
    },

    /// A stored row could not be decoded into the domain type.
    #[error("corrupt row during {operation}: {reason}")]
    Corrupt {
        /// What the store was doing.
        operation: String,
        /// Decoding error text.
        reason: String,
    },
}

impl StoreError {
    /// Shorthand for [`StoreError::Database`].
    pub fn database(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Database {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`StoreError::Corrupt`].
    pub fn corrupt(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}
