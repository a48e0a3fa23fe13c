//! # dms-migration: Document Version Migration
//!
//! Moves documents stored under one version of a schema to a later version
//! by replaying the declarative migration scripts attached to each
//! intermediate version.
//!
//! - **Steps** (`step.rs`): pure `FIELD_RENAME`, `FIELD_ADD`,
//!   `FIELD_REMOVE`, and `FIELD_TRANSFORM` application. Unknown and
//!   uninterpreted steps are skipped and reported, never fatal.
//!
//! - **Pipeline** (`pipeline.rs`): one transaction per entity. The row is
//!   locked, upgraded in memory, validated against the target version, and
//!   only then written.
//!
//! - **Store** (`store.rs`): the [`DocumentStore`] seam, with an in-memory
//!   implementation that emulates row locks.
//!
//! ## Crate Policy
//!
//! - Depends on `dms-core` and `dms-schema` internally.
//! - Schemas are read through the registry only.

pub mod error;
pub mod pipeline;
pub mod step;
pub mod store;

pub use error::MigrationError;
pub use pipeline::{MigrationPipeline, MigrationResult, MigrationWarning};
pub use step::{apply_step, StepOutcome};
pub use store::{
    DocumentStore, DocumentTransaction, InMemoryDocumentStore, InMemoryTransaction, StoredDocument,
};
