//! # Document Store
//!
//! Transactional access to business rows exposing `id`, a JSON `details`
//! column, and an integer `schema_version` column.
//!
//! A transaction locks each row it reads (`SELECT ... FOR UPDATE` in the
//! MySQL implementation) until it commits or rolls back, which serializes
//! concurrent migrations of the same entity. [`InMemoryDocumentStore`]
//! emulates the row lock with one `tokio::sync::Mutex` per row, held by the
//! transaction as an owned guard.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dms_core::{EntityRef, SchemaVersion, StoreError};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

/// A row as stored: both columns may be `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredDocument {
    /// `details` column.
    pub details: Option<Value>,
    /// `schema_version` column.
    pub schema_version: Option<i64>,
}

/// One open transaction against the document store.
pub trait DocumentTransaction: Send {
    /// Lock the row for update and read it. `None` if the row is absent.
    fn lock_document(
        &mut self,
        entity: &EntityRef,
    ) -> impl Future<Output = Result<Option<StoredDocument>, StoreError>> + Send;

    /// Overwrite `details` and `schema_version` of a row.
    fn write_document(
        &mut self,
        entity: &EntityRef,
        details: &Value,
        version: SchemaVersion,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Make the writes durable and release the locks.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard the writes and release the locks.
    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Source of document transactions.
pub trait DocumentStore: Send + Sync {
    /// Transaction type.
    type Tx: DocumentTransaction;

    /// Open a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;
}

// ─── In-memory implementation ───────────────────────────────────────

type Row = Arc<RowLock<StoredDocument>>;

/// Cloneable in-memory document store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    rows: Arc<Mutex<HashMap<EntityRef, Row>>>,
}

impl InMemoryDocumentStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row outside any transaction.
    pub fn insert(&self, entity: EntityRef, details: Option<Value>, schema_version: Option<i64>) {
        let doc = StoredDocument {
            details,
            schema_version,
        };
        self.rows
            .lock()
            .insert(entity, Arc::new(RowLock::new(doc)));
    }

    /// Current committed state of a row. Waits for any transaction holding
    /// the row to finish.
    pub async fn get(&self, entity: &EntityRef) -> Option<StoredDocument> {
        let row = self.row(entity)?;
        let doc = row.lock().await;
        Some(doc.clone())
    }

    fn row(&self, entity: &EntityRef) -> Option<Row> {
        self.rows.lock().get(entity).cloned()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction, StoreError> {
        Ok(InMemoryTransaction {
            store: self.clone(),
            locked: HashMap::new(),
            pending: HashMap::new(),
        })
    }
}

/// Transaction over an [`InMemoryDocumentStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    store: InMemoryDocumentStore,
    locked: HashMap<EntityRef, OwnedMutexGuard<StoredDocument>>,
    pending: HashMap<EntityRef, StoredDocument>,
}

impl InMemoryTransaction {
    async fn acquire(&mut self, entity: &EntityRef) -> Option<&mut OwnedMutexGuard<StoredDocument>> {
        if !self.locked.contains_key(entity) {
            let row = self.store.row(entity)?;
            let guard = row.lock_owned().await;
            self.locked.insert(entity.clone(), guard);
        }
        self.locked.get_mut(entity)
    }
}

impl DocumentTransaction for InMemoryTransaction {
    async fn lock_document(
        &mut self,
        entity: &EntityRef,
    ) -> Result<Option<StoredDocument>, StoreError> {
        if let Some(pending) = self.pending.get(entity) {
            return Ok(Some(pending.clone()));
        }
        Ok(self.acquire(entity).await.map(|guard| (**guard).clone()))
    }

    async fn write_document(
        &mut self,
        entity: &EntityRef,
        details: &Value,
        version: SchemaVersion,
    ) -> Result<(), StoreError> {
        if self.acquire(entity).await.is_none() {
            return Err(StoreError::database(
                "write document",
                format!("no row {entity}"),
            ));
        }
        self.pending.insert(
            entity.clone(),
            StoredDocument {
                details: Some(details.clone()),
                schema_version: Some(i64::from(version.get())),
            },
        );
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        for (entity, doc) in self.pending.drain() {
            if let Some(guard) = self.locked.get_mut(&entity) {
                **guard = doc;
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
