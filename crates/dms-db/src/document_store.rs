//! Business document persistence.
//!
//! Each [`MySqlTransaction`] wraps one `sqlx::Transaction`. Reads lock the
//! row with `FOR UPDATE`, so two migrations of the same entity serialize on
//! the database's row lock; dropping the transaction without committing
//! rolls it back.

use dms_core::{EntityRef, SchemaVersion, SqlIdentifier, StoreError};
use dms_migration::{DocumentStore, DocumentTransaction, StoredDocument};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{MySql, MySqlPool, Transaction};

use crate::store_error;

/// [`DocumentStore`] over a MariaDB pool.
#[derive(Debug, Clone)]
pub struct MySqlDocumentStore {
    pool: MySqlPool,
}

impl MySqlDocumentStore {
    /// A store over `pool`.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl DocumentStore for MySqlDocumentStore {
    type Tx = MySqlTransaction;

    async fn begin(&self) -> Result<MySqlTransaction, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(store_error("begin document transaction"))?;
        Ok(MySqlTransaction { tx })
    }
}

/// Open transaction over business rows.
pub struct MySqlTransaction {
    tx: Transaction<'static, MySql>,
}

impl std::fmt::Debug for MySqlTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlTransaction").finish_non_exhaustive()
    }
}

impl DocumentTransaction for MySqlTransaction {
    async fn lock_document(
        &mut self,
        entity: &EntityRef,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(&lock_sql(&entity.table))
            .bind(entity.id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error("lock document"))?;
        Ok(row.map(|r| StoredDocument {
            details: r.details.map(|Json(v)| v),
            schema_version: r.schema_version,
        }))
    }

    async fn write_document(
        &mut self,
        entity: &EntityRef,
        details: &Value,
        version: SchemaVersion,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&update_sql(&entity.table))
            .bind(Json(details))
            .bind(i64::from(version.get()))
            .bind(entity.id)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error("write document"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::database(
                "write document",
                format!("no row {entity}"),
            ));
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(store_error("commit document transaction"))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(store_error("roll back document transaction"))
    }
}

fn lock_sql(table: &SqlIdentifier) -> String {
    format!(
        "SELECT details, CAST(schema_version AS SIGNED) AS schema_version \
         FROM {table} WHERE id = ? FOR UPDATE"
    )
}

fn update_sql(table: &SqlIdentifier) -> String {
    format!("UPDATE {table} SET details = ?, schema_version = ? WHERE id = ?")
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct DocumentRow {
    details: Option<Json<Value>>,
    schema_version: Option<i64>,
}
