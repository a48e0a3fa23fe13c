//! # Columns Subcommand
//!
//! Projects a schema version's virtual columns onto its business table and
//! prints every DDL statement that was executed. Running it again after a
//! successful run prints nothing.

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use dms_projection::{Catalog, VirtualColumnProjector};
use dms_schema::{SchemaRegistry, SchemaStore};

use crate::schema::{parse_code, parse_version};

/// Arguments for the columns subcommand.
#[derive(Args, Debug)]
pub struct ColumnsArgs {
    #[command(subcommand)]
    pub command: ColumnsCommand,
}

/// Virtual column operations.
#[derive(Subcommand, Debug)]
pub enum ColumnsCommand {
    /// Create missing generated columns and indexes for a schema.
    Sync {
        /// Schema code.
        code: String,

        /// Use this version instead of the latest active one.
        #[arg(long)]
        version: Option<i64>,
    },
}

/// Execute a columns subcommand.
pub async fn run_columns<S: SchemaStore, C: Catalog, W: Write>(
    args: &ColumnsArgs,
    registry: &SchemaRegistry<S>,
    projector: &VirtualColumnProjector<C>,
    out: &mut W,
) -> Result<u8> {
    match &args.command {
        ColumnsCommand::Sync { code, version } => {
            let code = parse_code(code)?;
            let schema = match version {
                Some(v) => {
                    registry
                        .find_one_by_code_and_version(&code, parse_version(*v)?)
                        .await?
                }
                None => registry.find_latest_by_code(&code).await?,
            };
            if schema.table_name.is_none() {
                tracing::warn!(code = %schema.code, version = %schema.version, "schema has no table; nothing to sync");
            }

            let report = projector.setup_for_schema(&schema).await?;
            for sql in report.sql() {
                writeln!(out, "{sql};")?;
            }
            tracing::info!(
                code = %schema.code,
                version = %schema.version,
                statements = report.executed.len(),
                "virtual columns synced"
            );
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dms_core::{
        ColumnDataType, IndexType, JsonPath, NewSchema, SchemaCode, SqlIdentifier,
        VirtualColumnConfig,
    };
    use dms_projection::InMemoryCatalog;
    use dms_schema::InMemorySchemaStore;
    use serde_json::json;

    async fn registry() -> SchemaRegistry<InMemorySchemaStore> {
        let reg = SchemaRegistry::with_default_cache(InMemorySchemaStore::new());
        reg.register(
            NewSchema::new(SchemaCode::new("RFA_DWG_V1").unwrap(), json!({"type": "object"}))
                .with_table(SqlIdentifier::new("rfa_revisions").unwrap())
                .with_virtual_columns(vec![VirtualColumnConfig {
                    column_name: SqlIdentifier::new("v_drawing_no").unwrap(),
                    json_path: JsonPath::new("$.drawingNo").unwrap(),
                    data_type: ColumnDataType::Varchar,
                    index_type: Some(IndexType::Index),
                    is_required: true,
                }]),
        )
        .await
        .unwrap();
        reg
    }

    fn sync(version: Option<i64>) -> ColumnsArgs {
        ColumnsArgs {
            command: ColumnsCommand::Sync {
                code: "RFA_DWG_V1".into(),
                version,
            },
        }
    }

    #[tokio::test]
    async fn sync_prints_executed_ddl_once() {
        let reg = registry().await;
        let projector = VirtualColumnProjector::new(
            InMemoryCatalog::new().with_table("rfa_revisions", ["id", "details", "schema_version"]),
        );

        let mut out = Vec::new();
        assert_eq!(run_columns(&sync(None), &reg, &projector, &mut out).await.unwrap(), 0);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("ADD COLUMN v_drawing_no VARCHAR(255)"));
        assert!(text.contains("CREATE INDEX idx_rfa_revisions_v_drawing_no"));

        let mut out = Vec::new();
        run_columns(&sync(Some(1)), &reg, &projector, &mut out)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn unknown_version_is_an_error() {
        let reg = registry().await;
        let projector = VirtualColumnProjector::new(InMemoryCatalog::new());
        let mut out = Vec::new();
        assert!(run_columns(&sync(Some(9)), &reg, &projector, &mut out)
            .await
            .is_err());
    }
}
