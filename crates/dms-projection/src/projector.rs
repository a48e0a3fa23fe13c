//! # Virtual Column Projector
//!
//! Materializes a schema's virtual column configs as generated columns
//! (MariaDB `GENERATED ALWAYS AS (...) VIRTUAL`) and their indexes.
//!
//! The run is idempotent: columns and indexes that already exist are left
//! as they are, so re-running over an unchanged catalog executes nothing.
//! Definition drift on an existing column is not reconciled.

use dms_core::{SchemaDefinition, SqlIdentifier, StoreError, VirtualColumnConfig};

use crate::catalog::Catalog;
use crate::ddl::{sql_type, DdlStatement, IndexKind};
use crate::error::ProjectionError;

/// DDL actually executed by one projector run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionReport {
    /// Statements in execution order.
    pub executed: Vec<DdlStatement>,
}

impl ProjectionReport {
    /// Whether the run changed nothing.
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty()
    }

    /// SQL text of every executed statement.
    pub fn sql(&self) -> Vec<String> {
        self.executed.iter().map(DdlStatement::to_sql).collect()
    }
}

/// Creates generated columns and indexes through a [`Catalog`].
#[derive(Debug, Clone)]
pub struct VirtualColumnProjector<C> {
    catalog: C,
}

impl<C: Catalog> VirtualColumnProjector<C> {
    /// A projector over `catalog`.
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    /// The underlying catalog.
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Project the virtual columns declared by a schema row onto its table.
    /// A schema without a table yields an empty report.
    pub async fn setup_for_schema(
        &self,
        schema: &SchemaDefinition,
    ) -> Result<ProjectionReport, ProjectionError> {
        match &schema.table_name {
            Some(table) => self.setup_virtual_columns(table, &schema.virtual_columns).await,
            None => {
                tracing::debug!(code = %schema.code, version = %schema.version, "schema has no table; nothing to project");
                Ok(ProjectionReport::default())
            }
        }
    }

    /// Ensure each config exists as a generated column on `table`, then
    /// ensure the requested indexes.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::DdlExecutionFailure`] on the first failing lookup
    /// or statement; earlier statements stay applied.
    pub async fn setup_virtual_columns(
        &self,
        table: &SqlIdentifier,
        configs: &[VirtualColumnConfig],
    ) -> Result<ProjectionReport, ProjectionError> {
        let mut report = ProjectionReport::default();
        if configs.is_empty() {
            return Ok(report);
        }

        let exists = self
            .catalog
            .table_exists(table)
            .await
            .map_err(|e| lookup_failure(table, "table lookup", e))?;
        if !exists {
            tracing::warn!(table = %table, "table not found; skipping virtual columns");
            return Ok(report);
        }

        for config in configs {
            self.ensure_column(table, config, &mut report).await?;
        }
        for config in configs {
            if let Some(kind) = config.index_type.and_then(IndexKind::for_index_type) {
                self.ensure_index(table, config, kind, &mut report).await?;
            }
        }

        tracing::info!(table = %table, executed = report.executed.len(), "virtual columns set up");
        Ok(report)
    }

    async fn ensure_column(
        &self,
        table: &SqlIdentifier,
        config: &VirtualColumnConfig,
        report: &mut ProjectionReport,
    ) -> Result<(), ProjectionError> {
        let present = self
            .catalog
            .column_exists(table, &config.column_name)
            .await
            .map_err(|e| lookup_failure(table, "column lookup", e))?;
        if present {
            tracing::debug!(table = %table, column = %config.column_name, "column already exists");
            return Ok(());
        }

        let statement = DdlStatement::AddVirtualColumn {
            table: table.clone(),
            column: config.column_name.clone(),
            sql_type: sql_type(&config.data_type),
            json_path: config.json_path.clone(),
        };
        self.run(table, statement, report).await
    }

    async fn ensure_index(
        &self,
        table: &SqlIdentifier,
        config: &VirtualColumnConfig,
        kind: IndexKind,
        report: &mut ProjectionReport,
    ) -> Result<(), ProjectionError> {
        let index = index_name(table, &config.column_name)?;
        let present = self
            .catalog
            .index_exists(table, &index)
            .await
            .map_err(|e| lookup_failure(table, "index lookup", e))?;
        if present {
            tracing::debug!(table = %table, index = %index, "index already exists");
            return Ok(());
        }

        let statement = DdlStatement::CreateIndex {
            table: table.clone(),
            index,
            column: config.column_name.clone(),
            kind,
        };
        self.run(table, statement, report).await
    }

    async fn run(
        &self,
        table: &SqlIdentifier,
        statement: DdlStatement,
        report: &mut ProjectionReport,
    ) -> Result<(), ProjectionError> {
        let sql = statement.to_sql();
        if let Err(e) = self.catalog.execute(&statement).await {
            tracing::error!(table = %table, statement = %sql, error = %e, "DDL failed");
            return Err(ProjectionError::DdlExecutionFailure {
                table: table.clone(),
                statement: sql,
                reason: e.to_string(),
            });
        }
        tracing::info!(table = %table, statement = %sql, "DDL executed");
        report.executed.push(statement);
        Ok(())
    }
}

/// `idx_<table>_<column>`.
pub fn index_name(
    table: &SqlIdentifier,
    column: &SqlIdentifier,
) -> Result<SqlIdentifier, ProjectionError> {
    SqlIdentifier::new(format!("idx_{table}_{column}")).map_err(|source| ProjectionError::IndexName {
        table: table.clone(),
        source,
    })
}

fn lookup_failure(table: &SqlIdentifier, what: &str, err: StoreError) -> ProjectionError {
    ProjectionError::DdlExecutionFailure {
        table: table.clone(),
        statement: what.to_string(),
        reason: err.to_string(),
    }
}
