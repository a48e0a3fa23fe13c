//! # Projection Error Types

use dms_core::{IdentifierError, SqlIdentifier};
use thiserror::Error;

/// Errors from [`VirtualColumnProjector`](crate::VirtualColumnProjector).
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// A catalog lookup or DDL statement failed. Statements executed before
    /// the failure stay applied.
    #[error("DDL on {table} failed: {reason} (statement: {statement})")]
    DdlExecutionFailure {
        /// Table being projected.
        table: SqlIdentifier,
        /// SQL text, or the catalog lookup, that failed.
        statement: String,
        /// Driver error text.
        reason: String,
    },

    /// The derived index name `idx_<table>_<column>` is not a valid
    /// identifier, typically because it exceeds 64 characters.
    #[error("cannot name index for {table}: {source}")]
    IndexName {
        /// Table being projected.
        table: SqlIdentifier,
        /// Why the name was rejected.
        #[source]
        source: IdentifierError,
    },
}
