//! # Validator Cache
//!
//! Compiled schemas keyed by code ("latest") and by `(code, version)`
//! ("pinned"). Injected into the registry at construction; there is no
//! process-global cache.
//!
//! ## Concurrency
//!
//! The map sits behind a `parking_lot::RwLock` that is only held for map
//! operations, never while compiling and never across an `.await`. Readers
//! receive `Arc<CompiledSchema>` values that are fully constructed before
//! insertion.
//!
//! Each code carries a generation counter. A caller snapshots the
//! generation before loading a schema row, compiles outside the lock, and
//! inserts with the snapshot. If [`ValidatorCache::invalidate`] ran in the
//! meantime the insert is dropped, so a compile that raced with a
//! registration can never re-insert the superseded schema.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dms_core::{SchemaCode, SchemaDefinition, SchemaVersion};
use jsonschema::Validator;
use parking_lot::RwLock;
use serde_json::Value;

use crate::policy::ObjectPolicy;
use crate::validate::{collect_violations, compile_validator, ValidationViolations};

// ─── CompiledSchema ─────────────────────────────────────────────────

/// A schema row together with its compiled validator and field policy.
pub struct CompiledSchema {
    schema: SchemaDefinition,
    validator: Validator,
    policy: ObjectPolicy,
}

impl CompiledSchema {
    /// Compile a stored schema row.
    ///
    /// # Errors
    ///
    /// Returns the JSON Schema compiler's message, or the location and
    /// reason of the first malformed field annotation.
    pub fn compile(schema: SchemaDefinition) -> Result<Self, String> {
        let validator = compile_validator(&schema.definition)?;
        let policy = ObjectPolicy::from_definition(&schema.definition)?;
        Ok(Self {
            schema,
            validator,
            policy,
        })
    }

    /// The stored row this was compiled from.
    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    /// Schema version.
    pub fn version(&self) -> SchemaVersion {
        self.schema.version
    }

    /// Typed `x-encrypt` / `x-security` policy.
    pub fn policy(&self) -> &ObjectPolicy {
        &self.policy
    }

    /// Validate an instance, collecting every violation.
    pub fn violations(&self, instance: &Value) -> ValidationViolations {
        collect_violations(&self.validator, instance)
    }

    /// Fast boolean validity check.
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("code", &self.schema.code)
            .field("version", &self.schema.version)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ─── ValidatorCache ─────────────────────────────────────────────────

/// Generation counter value observed before a schema load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Default)]
struct CodeSlot {
    generation: u64,
    latest: Option<Arc<CompiledSchema>>,
    pinned: HashMap<SchemaVersion, Arc<CompiledSchema>>,
}

/// Cache of compiled schemas shared by everything that validates.
#[derive(Default)]
pub struct ValidatorCache {
    slots: RwLock<HashMap<SchemaCode, CodeSlot>>,
}

impl ValidatorCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the generation of `code` before loading its row.
    pub fn generation(&self, code: &SchemaCode) -> Generation {
        Generation(
            self.slots
                .read()
                .get(code)
                .map(|slot| slot.generation)
                .unwrap_or(0),
        )
    }

    /// Cached "latest" schema for `code`.
    pub fn latest(&self, code: &SchemaCode) -> Option<Arc<CompiledSchema>> {
        self.slots
            .read()
            .get(code)
            .and_then(|slot| slot.latest.clone())
    }

    /// Cached schema for a pinned version. A "latest" entry with the same
    /// version also answers.
    pub fn pinned(&self, code: &SchemaCode, version: SchemaVersion) -> Option<Arc<CompiledSchema>> {
        let slots = self.slots.read();
        let slot = slots.get(code)?;
        slot.pinned.get(&version).cloned().or_else(|| {
            slot.latest
                .as_ref()
                .filter(|c| c.version() == version)
                .cloned()
        })
    }

    /// Cache `compiled` as the latest schema of `code`, unless the code was
    /// invalidated after `seen` was taken. Returns whether it was stored.
    pub fn insert_latest(
        &self,
        code: &SchemaCode,
        seen: Generation,
        compiled: Arc<CompiledSchema>,
    ) -> bool {
        let mut slots = self.slots.write();
        let slot = slots.entry(code.clone()).or_default();
        if slot.generation != seen.0 {
            return false;
        }
        slot.latest = Some(compiled);
        true
    }

    /// Cache `compiled` under its own version, with the same generation
    /// check as [`ValidatorCache::insert_latest`].
    pub fn insert_pinned(
        &self,
        code: &SchemaCode,
        seen: Generation,
        compiled: Arc<CompiledSchema>,
    ) -> bool {
        let mut slots = self.slots.write();
        let slot = slots.entry(code.clone()).or_default();
        if slot.generation != seen.0 {
            return false;
        }
        slot.pinned.insert(compiled.version(), compiled);
        true
    }

    /// Evict every entry for `code` and advance its generation.
    pub fn invalidate(&self, code: &SchemaCode) {
        let mut slots = self.slots.write();
        let slot = slots.entry(code.clone()).or_default();
        slot.generation += 1;
        slot.latest = None;
        slot.pinned.clear();
    }

    /// Number of cached compiled schemas across all codes.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .map(|slot| slot.pinned.len() + usize::from(slot.latest.is_some()))
            .sum()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ValidatorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn row(version: i64) -> SchemaDefinition {
        SchemaDefinition {
            id: version,
            code: SchemaCode::new("RFA_DWG_V1").unwrap(),
            version: SchemaVersion::new(version).unwrap(),
            table_name: None,
            definition: json!({
                "type": "object",
                "required": ["drawingNo"],
                "properties": {
                    "drawingNo": {"type": "string"},
                    "costCenter": {"type": "string", "x-encrypt": true}
                }
            }),
            migration_script: None,
            virtual_columns: Vec::new(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn compiled(version: i64) -> Arc<CompiledSchema> {
        Arc::new(CompiledSchema::compile(row(version)).unwrap())
    }

    #[test]
    fn compile_builds_validator_and_policy() {
        let c = compiled(1);
        assert!(c.is_valid(&json!({"drawingNo": "A-1"})));
        assert!(!c.is_valid(&json!({})));
        assert!(c.violations(&json!({})).mentions("drawingNo"));
        assert_eq!(c.policy().encrypted_fields(), vec!["costCenter"]);
    }

    #[test]
    fn compile_rejects_bad_annotations() {
        let mut bad = row(1);
        bad.definition = json!({"properties": {"a": {"x-encrypt": 1}}});
        assert!(CompiledSchema::compile(bad).is_err());
    }

    #[test]
    fn latest_and_pinned_lookups() {
        let cache = ValidatorCache::new();
        let code = SchemaCode::new("RFA_DWG_V1").unwrap();
        let gen = cache.generation(&code);

        assert!(cache.insert_latest(&code, gen, compiled(2)));
        assert!(cache.insert_pinned(&code, gen, compiled(1)));

        assert_eq!(cache.latest(&code).unwrap().version().get(), 2);
        assert_eq!(
            cache.pinned(&code, SchemaVersion::FIRST).unwrap().version().get(),
            1
        );
        // The latest entry answers a pinned lookup for its own version.
        assert!(cache.pinned(&code, SchemaVersion::new(2).unwrap()).is_some());
        assert!(cache.pinned(&code, SchemaVersion::new(3).unwrap()).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_evicts_and_rejects_stale_inserts() {
        let cache = ValidatorCache::new();
        let code = SchemaCode::new("RFA_DWG_V1").unwrap();

        let before = cache.generation(&code);
        assert!(cache.insert_latest(&code, before, compiled(1)));

        cache.invalidate(&code);
        assert!(cache.latest(&code).is_none());
        assert!(cache.is_empty());

        // A compile that started before the invalidation must not land.
        assert!(!cache.insert_latest(&code, before, compiled(1)));
        assert!(!cache.insert_pinned(&code, before, compiled(1)));
        assert!(cache.is_empty());

        let after = cache.generation(&code);
        assert_ne!(before, after);
        assert!(cache.insert_latest(&code, after, compiled(2)));
    }

    #[test]
    fn codes_are_independent() {
        let cache = ValidatorCache::new();
        let a = SchemaCode::new("A").unwrap();
        let b = SchemaCode::new("RFA_DWG_V1").unwrap();
        let gen_b = cache.generation(&b);
        cache.insert_latest(&b, gen_b, compiled(1));
        cache.invalidate(&a);
        assert!(cache.latest(&b).is_some());
    }
}
