//! # Catalog
//!
//! Introspection and DDL execution seam for the projector. `dms-db`
//! implements it over `information_schema`; [`InMemoryCatalog`] records
//! tables, columns, indexes, and executed statements for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use dms_core::{SqlIdentifier, StoreError};
use parking_lot::Mutex;

use crate::ddl::DdlStatement;

/// Database catalog used by the projector.
pub trait Catalog: Send + Sync {
    /// Whether `table` exists in the current database.
    fn table_exists(
        &self,
        table: &SqlIdentifier,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Whether `table` has a column named `column`.
    fn column_exists(
        &self,
        table: &SqlIdentifier,
        column: &SqlIdentifier,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Whether `table` has an index named `index`.
    fn index_exists(
        &self,
        table: &SqlIdentifier,
        index: &SqlIdentifier,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Execute a DDL statement.
    fn execute(&self, statement: &DdlStatement)
        -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Default)]
struct TableState {
    columns: BTreeSet<String>,
    indexes: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct CatalogState {
    tables: BTreeMap<String, TableState>,
    executed: Vec<DdlStatement>,
    fail_on: Option<String>,
}

/// Cloneable in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl InMemoryCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table with the given existing columns.
    pub fn with_table<'a>(self, table: &str, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.state.lock().tables.insert(
            table.to_string(),
            TableState {
                columns: columns.into_iter().map(str::to_string).collect(),
                indexes: BTreeSet::new(),
            },
        );
        self
    }

    /// Make every statement whose SQL contains `needle` fail.
    pub fn fail_statements_containing(&self, needle: &str) {
        self.state.lock().fail_on = Some(needle.to_string());
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<DdlStatement> {
        self.state.lock().executed.clone()
    }

    /// Whether `table` currently has `column`.
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.state
            .lock()
            .tables
            .get(table)
            .is_some_and(|t| t.columns.contains(column))
    }

    /// Whether `table` currently has `index`.
    pub fn has_index(&self, table: &str, index: &str) -> bool {
        self.state
            .lock()
            .tables
            .get(table)
            .is_some_and(|t| t.indexes.contains(index))
    }
}

impl Catalog for InMemoryCatalog {
    async fn table_exists(&self, table: &SqlIdentifier) -> Result<bool, StoreError> {
        Ok(self.state.lock().tables.contains_key(table.as_str()))
    }

    async fn column_exists(
        &self,
        table: &SqlIdentifier,
        column: &SqlIdentifier,
    ) -> Result<bool, StoreError> {
        Ok(self.has_column(table.as_str(), column.as_str()))
    }

    async fn index_exists(
        &self,
        table: &SqlIdentifier,
        index: &SqlIdentifier,
    ) -> Result<bool, StoreError> {
        Ok(self.has_index(table.as_str(), index.as_str()))
    }

    async fn execute(&self, statement: &DdlStatement) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let sql = statement.to_sql();
        if state.fail_on.as_deref().is_some_and(|n| sql.contains(n)) {
            return Err(StoreError::database("execute ddl", "injected failure"));
        }
        let table = state
            .tables
            .get_mut(statement.table().as_str())
            .ok_or_else(|| {
                StoreError::database("execute ddl", format!("table {} doesn't exist", statement.table()))
            })?;
        match statement {
            DdlStatement::AddVirtualColumn { column, .. } => {
                if !table.columns.insert(column.to_string()) {
                    return Err(StoreError::database(
                        "execute ddl",
                        format!("duplicate column name '{column}'"),
                    ));
                }
            }
            DdlStatement::CreateIndex { index, column, .. } => {
                if !table.columns.contains(column.as_str()) {
                    return Err(StoreError::database(
                        "execute ddl",
                        format!("key column '{column}' doesn't exist in table"),
                    ));
                }
                if !table.indexes.insert(index.to_string()) {
                    return Err(StoreError::database(
                        "execute ddl",
                        format!("duplicate key name '{index}'"),
                    ));
                }
            }
        }
        state.executed.push(statement.clone());
        Ok(())
    }
}
