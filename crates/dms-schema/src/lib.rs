//! # dms-schema: Schema Registry & Field Security
//!
//! Versioned JSON Schema storage, compiled-validator caching, and the
//! field-level security layer driven by schema annotations.
//!
//! ## Registry (`registry`)
//!
//! [`SchemaRegistry`] registers definitions as successive versions of a
//! schema code, resolves the latest active or a pinned version, and
//! validates documents (draft from `$schema`, default 2020-12) with
//! structured violations. It is generic over a [`SchemaStore`]; compiled
//! schemas live in an injected [`ValidatorCache`].
//!
//! ## Field Security (`policy`, `security`)
//!
//! `x-encrypt` and `x-security` annotations are compiled into a typed
//! [`ObjectPolicy`] alongside the validator. [`FieldSecurityProcessor`]
//! walks documents with that policy: encrypting flagged fields on write,
//! decrypting and masking or removing restricted fields on read.
//!
//! ## Crate Policy
//!
//! - Depends on `dms-core` and `dms-crypto` internally.
//! - Schema validation is a trust boundary: invalid documents are rejected
//!   with one violation per failing location.
//! - External `$ref`s are never fetched.

pub mod cache;
pub mod error;
pub mod policy;
pub mod registry;
pub mod security;
pub mod store;
pub mod validate;

pub use cache::{CompiledSchema, Generation, ValidatorCache};
pub use error::SchemaError;
pub use policy::{AccessRule, DenyAction, FieldPolicy, NestedPolicy, ObjectPolicy};
pub use registry::SchemaRegistry;
pub use security::{FieldSecurityProcessor, DEFAULT_SUPER_ROLE, MASK_LITERAL};
pub use store::{InMemorySchemaStore, SchemaStore};
pub use validate::{ValidationViolations, Violation};
