//! # Schema Registry
//!
//! Authoritative source of versioned schemas. Owns the schema rows (through
//! its [`SchemaStore`]) and the compiled-validator cache, and answers
//! validation requests for the latest or a pinned version of a code.
//!
//! ## Versioning
//!
//! Registering a code that already exists inserts `max(version) + 1`; the
//! previous rows stay so documents can be migrated up from any past
//! version. Deactivated versions are skipped when resolving "latest" but
//! remain resolvable by exact version.

use std::sync::Arc;

use dms_core::{
    MigrationScript, NewSchema, SchemaCode, SchemaDefinition, SchemaFilter, SchemaVersion,
    SecurityContext,
};
use serde_json::Value;

use crate::cache::{CompiledSchema, ValidatorCache};
use crate::error::SchemaError;
use crate::policy::ObjectPolicy;
use crate::security::FieldSecurityProcessor;
use crate::store::SchemaStore;
use crate::validate::compile_validator;

/// Versioned schema storage plus validation.
#[derive(Debug)]
pub struct SchemaRegistry<S> {
    store: S,
    cache: Arc<ValidatorCache>,
}

impl<S: SchemaStore> SchemaRegistry<S> {
    /// A registry over `store` sharing `cache`.
    pub fn new(store: S, cache: Arc<ValidatorCache>) -> Self {
        Self { store, cache }
    }

    /// A registry with a private, empty cache.
    pub fn with_default_cache(store: S) -> Self {
        Self::new(store, Arc::new(ValidatorCache::new()))
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The validator cache.
    pub fn cache(&self) -> &Arc<ValidatorCache> {
        &self.cache
    }

    // ─── Registration ───────────────────────────────────────────────

    /// Register a bare definition as the next version of `code`.
    pub async fn create_or_update(
        &self,
        code: SchemaCode,
        definition: Value,
    ) -> Result<SchemaDefinition, SchemaError> {
        self.register(NewSchema::new(code, definition)).await
    }

    /// Register a definition with its table, migration script, and virtual
    /// columns as the next version of its code.
    ///
    /// # Errors
    ///
    /// [`SchemaError::InvalidSchemaDefinition`] if the definition does not
    /// compile, its annotations are malformed, or the migration script is
    /// not `{"steps": [...]}`. Nothing is stored in that case.
    pub async fn register(&self, new: NewSchema) -> Result<SchemaDefinition, SchemaError> {
        compile_validator(&new.definition).map_err(|reason| SchemaError::invalid(&new.code, reason))?;
        ObjectPolicy::from_definition(&new.definition)
            .map_err(|reason| SchemaError::invalid(&new.code, reason))?;

        let code = new.code.clone();
        let stored = self.store.insert_next_version(new).await?;
        self.cache.invalidate(&code);

        tracing::info!(
            code = %stored.code,
            version = %stored.version,
            table = stored.table_name.as_ref().map(|t| t.as_str()).unwrap_or("-"),
            "schema registered"
        );
        Ok(stored)
    }

    /// Parse a raw migration script payload, rejecting anything that is not
    /// `{"steps": [...]}`.
    pub fn parse_migration_script(
        code: &SchemaCode,
        raw: &Value,
    ) -> Result<MigrationScript, SchemaError> {
        match raw.get("steps") {
            Some(Value::Array(_)) => serde_json::from_value(raw.clone())
                .map_err(|e| SchemaError::invalid(code, format!("migration script: {e}"))),
            _ => Err(SchemaError::invalid(
                code,
                "migration script must be an object with a \"steps\" array",
            )),
        }
    }

    // ─── Lookup ─────────────────────────────────────────────────────

    /// Exact version lookup, active or not.
    pub async fn find_one_by_code_and_version(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
    ) -> Result<SchemaDefinition, SchemaError> {
        self.store
            .find_version(code, version)
            .await?
            .ok_or_else(|| SchemaError::not_found(code, Some(version)))
    }

    /// Highest active version of `code`.
    pub async fn find_latest_by_code(
        &self,
        code: &SchemaCode,
    ) -> Result<SchemaDefinition, SchemaError> {
        self.store
            .find_latest_active(code)
            .await?
            .ok_or_else(|| SchemaError::not_found(code, None))
    }

    /// All rows passing `filter`, ordered by code then version.
    pub async fn find_all(&self, filter: &SchemaFilter) -> Result<Vec<SchemaDefinition>, SchemaError> {
        Ok(self.store.list(filter).await?)
    }

    /// Mark a version inactive.
    pub async fn deactivate(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
    ) -> Result<SchemaDefinition, SchemaError> {
        self.set_active(code, version, false).await
    }

    /// Mark a version active again.
    pub async fn activate(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
    ) -> Result<SchemaDefinition, SchemaError> {
        self.set_active(code, version, true).await
    }

    async fn set_active(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
        active: bool,
    ) -> Result<SchemaDefinition, SchemaError> {
        let row = self
            .store
            .set_active(code, version, active)
            .await?
            .ok_or_else(|| SchemaError::not_found(code, Some(version)))?;
        self.cache.invalidate(code);
        tracing::info!(code = %code, version = %version, active, "schema activation changed");
        Ok(row)
    }

    // ─── Compiled access ────────────────────────────────────────────

    /// Compiled form of the latest active version, cached.
    pub async fn compiled(&self, code: &SchemaCode) -> Result<Arc<CompiledSchema>, SchemaError> {
        if let Some(hit) = self.cache.latest(code) {
            tracing::debug!(code = %code, version = %hit.version(), "validator cache hit");
            return Ok(hit);
        }
        let seen = self.cache.generation(code);
        let row = self.find_latest_by_code(code).await?;
        let compiled = Arc::new(compile_row(row)?);
        let stored = self.cache.insert_latest(code, seen, Arc::clone(&compiled));
        tracing::debug!(code = %code, version = %compiled.version(), cached = stored, "schema compiled");
        Ok(compiled)
    }

    /// Compiled form of an exact version, cached.
    pub async fn compiled_version(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
    ) -> Result<Arc<CompiledSchema>, SchemaError> {
        if let Some(hit) = self.cache.pinned(code, version) {
            tracing::debug!(code = %code, version = %version, "validator cache hit");
            return Ok(hit);
        }
        let seen = self.cache.generation(code);
        let row = self.find_one_by_code_and_version(code, version).await?;
        let compiled = Arc::new(compile_row(row)?);
        let stored = self.cache.insert_pinned(code, seen, Arc::clone(&compiled));
        tracing::debug!(code = %code, version = %version, cached = stored, "schema compiled");
        Ok(compiled)
    }

    // ─── Validation ─────────────────────────────────────────────────

    /// Validate `data` against the latest active version of `code`.
    ///
    /// # Errors
    ///
    /// [`SchemaError::ValidationFailed`] with every violation when `data`
    /// does not conform; [`SchemaError::SchemaNotFound`] for an unknown code.
    pub async fn validate(&self, code: &SchemaCode, data: &Value) -> Result<bool, SchemaError> {
        let compiled = self.compiled(code).await?;
        check(&compiled, data)
    }

    /// Validate `data` against an exact version of `code`.
    pub async fn validate_version(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
        data: &Value,
    ) -> Result<bool, SchemaError> {
        let compiled = self.compiled_version(code, version).await?;
        check(&compiled, data)
    }

    // ─── Document processing ────────────────────────────────────────

    /// Validate a document for storage, then encrypt its `x-encrypt` fields.
    pub async fn process_write_data(
        &self,
        code: &SchemaCode,
        data: &Value,
        processor: &FieldSecurityProcessor,
    ) -> Result<Value, SchemaError> {
        let compiled = self.compiled(code).await?;
        check(&compiled, data)?;
        processor.encrypt_fields(data, compiled.policy())
    }

    /// Decrypt and role-filter a stored document for `ctx`.
    pub async fn process_read_data(
        &self,
        code: &SchemaCode,
        data: &Value,
        ctx: &SecurityContext,
        processor: &FieldSecurityProcessor,
    ) -> Result<Value, SchemaError> {
        let compiled = self.compiled(code).await?;
        Ok(processor.decrypt_and_filter_fields(data, compiled.policy(), ctx))
    }
}

fn compile_row(row: SchemaDefinition) -> Result<CompiledSchema, SchemaError> {
    let code = row.code.clone();
    CompiledSchema::compile(row).map_err(|reason| SchemaError::invalid(&code, reason))
}

fn check(compiled: &CompiledSchema, data: &Value) -> Result<bool, SchemaError> {
    if compiled.is_valid(data) {
        return Ok(true);
    }
    Err(SchemaError::ValidationFailed {
        code: compiled.schema().code.clone(),
        version: compiled.version(),
        violations: compiled.violations(data),
    })
}
