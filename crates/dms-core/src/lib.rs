//! # dms-core: Foundational Types for the Document Schema Engine
//!
//! Every other crate in the workspace depends on `dms-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `SchemaCode`, `SchemaVersion`,
//!    `SqlIdentifier`, `JsonPath`: all newtypes with validated constructors.
//!    Table and column names are interpolated into SQL, so no bare strings
//!    reach a statement builder.
//!
//! 2. **One schema row type.** [`SchemaDefinition`] is shared by the
//!    registry, the migration pipeline, the projector, and the database
//!    layer. The JSON-Schema document itself stays an untyped
//!    `serde_json::Value`; typed interpretation of the `x-encrypt` /
//!    `x-security` annotations happens once at compile time in `dms-schema`.
//!
//! 3. **Lenient migration steps.** [`MigrationStep`] keeps unknown step types
//!    as data instead of failing deserialization, so a single bad step
//!    descriptor cannot block an otherwise-valid migration.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `dms-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod schema;
pub mod security;

// Re-export primary types for ergonomic imports.
pub use error::{IdentifierError, StoreError};
pub use identity::{EntityRef, JsonPath, SchemaCode, SchemaVersion, SqlIdentifier};
pub use schema::{
    ColumnDataType, IndexType, MigrationScript, MigrationStep, NewSchema, SchemaDefinition,
    SchemaFilter, StepType, VirtualColumnConfig,
};
pub use security::SecurityContext;
