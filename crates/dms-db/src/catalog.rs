//! Catalog introspection and DDL over `information_schema`.
//!
//! Lookups are scoped to the connection's current database
//! (`table_schema = DATABASE()`). DDL is sent over the text protocol since
//! it takes no parameters.

use dms_core::{SqlIdentifier, StoreError};
use dms_projection::{Catalog, DdlStatement};
use sqlx::MySqlPool;

use crate::store_error;

/// [`Catalog`] over a MariaDB pool.
#[derive(Debug, Clone)]
pub struct MySqlCatalog {
    pool: MySqlPool,
}

impl MySqlCatalog {
    /// A catalog over `pool`.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl Catalog for MySqlCatalog {
    async fn table_exists(&self, table: &SqlIdentifier) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE table_schema = DATABASE() AND table_name = ?",
        )
        .bind(table.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error("table lookup"))?;
        Ok(count > 0)
    }

    async fn column_exists(
        &self,
        table: &SqlIdentifier,
        column: &SqlIdentifier,
    ) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.COLUMNS \
             WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?",
        )
        .bind(table.as_str())
        .bind(column.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error("column lookup"))?;
        Ok(count > 0)
    }

    async fn index_exists(
        &self,
        table: &SqlIdentifier,
        index: &SqlIdentifier,
    ) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.STATISTICS \
             WHERE table_schema = DATABASE() AND table_name = ? AND index_name = ?",
        )
        .bind(table.as_str())
        .bind(index.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error("index lookup"))?;
        Ok(count > 0)
    }

    async fn execute(&self, statement: &DdlStatement) -> Result<(), StoreError> {
        let sql = statement.to_sql();
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map_err(store_error("execute ddl"))?;
        Ok(())
    }
}
