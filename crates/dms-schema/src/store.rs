//! # Schema Store
//!
//! Persistence seam for schema rows. The registry is generic over
//! [`SchemaStore`]; `dms-db` provides the MySQL implementation and
//! [`InMemorySchemaStore`] backs tests and the offline CLI paths.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use dms_core::{NewSchema, SchemaCode, SchemaDefinition, SchemaFilter, SchemaVersion, StoreError};
use parking_lot::RwLock;

/// Storage of versioned schema rows.
///
/// Implementations must assign versions atomically: two concurrent
/// `insert_next_version` calls for one code never produce the same version.
pub trait SchemaStore: Send + Sync {
    /// Insert `new` as version `max(version) + 1` of its code (1 if the
    /// code is new), active, and return the stored row.
    fn insert_next_version(
        &self,
        new: NewSchema,
    ) -> impl Future<Output = Result<SchemaDefinition, StoreError>> + Send;

    /// Row for an exact version, active or not.
    fn find_version(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
    ) -> impl Future<Output = Result<Option<SchemaDefinition>, StoreError>> + Send;

    /// Highest-versioned active row of a code.
    fn find_latest_active(
        &self,
        code: &SchemaCode,
    ) -> impl Future<Output = Result<Option<SchemaDefinition>, StoreError>> + Send;

    /// Rows passing `filter`, ordered by code then version.
    fn list(
        &self,
        filter: &SchemaFilter,
    ) -> impl Future<Output = Result<Vec<SchemaDefinition>, StoreError>> + Send;

    /// Set the active flag of one row. `None` if the row does not exist.
    fn set_active(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
        active: bool,
    ) -> impl Future<Output = Result<Option<SchemaDefinition>, StoreError>> + Send;
}

// ─── In-memory implementation ───────────────────────────────────────

/// Thread-safe, cloneable in-memory schema store.
///
/// The lock is `parking_lot` and never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaStore {
    rows: Arc<RwLock<Vec<SchemaDefinition>>>,
}

impl InMemorySchemaStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows across all codes.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SchemaStore for InMemorySchemaStore {
    async fn insert_next_version(&self, new: NewSchema) -> Result<SchemaDefinition, StoreError> {
        let mut rows = self.rows.write();
        let version = rows
            .iter()
            .filter(|r| r.code == new.code)
            .map(|r| r.version)
            .max()
            .map(SchemaVersion::next)
            .unwrap_or(SchemaVersion::FIRST);
        let id = i64::try_from(rows.len())
            .map_err(|e| StoreError::database("insert schema version", e))?
            + 1;
        let now = Utc::now();
        let row = SchemaDefinition {
            id,
            code: new.code,
            version,
            table_name: new.table_name,
            definition: new.definition,
            migration_script: new.migration_script,
            virtual_columns: new.virtual_columns,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn find_version(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
    ) -> Result<Option<SchemaDefinition>, StoreError> {
        Ok(self
            .rows
            .read()
            .iter()
            .find(|r| &r.code == code && r.version == version)
            .cloned())
    }

    async fn find_latest_active(
        &self,
        code: &SchemaCode,
    ) -> Result<Option<SchemaDefinition>, StoreError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|r| &r.code == code && r.is_active)
            .max_by_key(|r| r.version)
            .cloned())
    }

    async fn list(&self, filter: &SchemaFilter) -> Result<Vec<SchemaDefinition>, StoreError> {
        let mut out: Vec<SchemaDefinition> = self
            .rows
            .read()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.code, a.version).cmp(&(&b.code, b.version)));
        Ok(out)
    }

    async fn set_active(
        &self,
        code: &SchemaCode,
        version: SchemaVersion,
        active: bool,
    ) -> Result<Option<SchemaDefinition>, StoreError> {
        let mut rows = self.rows.write();
        Ok(rows
            .iter_mut()
            .find(|r| &r.code == code && r.version == version)
            .map(|r| {
                r.is_active = active;
                r.updated_at = Utc::now();
                r.clone()
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code(s: &str) -> SchemaCode {
        SchemaCode::new(s).unwrap()
    }

    #[tokio::test]
    async fn versions_increment_per_code() {
        let store = InMemorySchemaStore::new();
        let a1 = store
            .insert_next_version(NewSchema::new(code("A"), json!({})))
            .await
            .unwrap();
        let b1 = store
            .insert_next_version(NewSchema::new(code("B"), json!({})))
            .await
            .unwrap();
        let a2 = store
            .insert_next_version(NewSchema::new(code("A"), json!({"type": "object"})))
            .await
            .unwrap();
        assert_eq!(a1.version.get(), 1);
        assert_eq!(b1.version.get(), 1);
        assert_eq!(a2.version.get(), 2);
        assert_ne!(a1.id, a2.id);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn latest_skips_inactive_rows() {
        let store = InMemorySchemaStore::new();
        for _ in 0..3 {
            store
                .insert_next_version(NewSchema::new(code("A"), json!({})))
                .await
                .unwrap();
        }
        let v3 = SchemaVersion::new(3).unwrap();
        store.set_active(&code("A"), v3, false).await.unwrap();

        let latest = store.find_latest_active(&code("A")).await.unwrap().unwrap();
        assert_eq!(latest.version.get(), 2);

        // Pinned lookups still see the inactive row.
        let pinned = store.find_version(&code("A"), v3).await.unwrap().unwrap();
        assert!(!pinned.is_active);

        // Versioning continues past the inactive row.
        let v4 = store
            .insert_next_version(NewSchema::new(code("A"), json!({})))
            .await
            .unwrap();
        assert_eq!(v4.version.get(), 4);
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let store = InMemorySchemaStore::new();
        for c in ["RFA_DWG_V1", "CORR_BODY", "RFA_DWG_V1"] {
            store
                .insert_next_version(NewSchema::new(code(c), json!({})))
                .await
                .unwrap();
        }
        let all = store.list(&SchemaFilter::default()).await.unwrap();
        let keys: Vec<(String, u32)> = all
            .iter()
            .map(|r| (r.code.to_string(), r.version.get()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("CORR_BODY".to_string(), 1),
                ("RFA_DWG_V1".to_string(), 1),
                ("RFA_DWG_V1".to_string(), 2)
            ]
        );

        let rfa = store
            .list(&SchemaFilter {
                code_contains: Some("rfa".into()),
                active: None,
            })
            .await
            .unwrap();
        assert_eq!(rfa.len(), 2);
    }

    #[tokio::test]
    async fn set_active_on_missing_row_is_none() {
        let store = InMemorySchemaStore::new();
        let missing = store
            .set_active(&code("NOPE"), SchemaVersion::FIRST, false)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
