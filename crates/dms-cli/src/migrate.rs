//! # Migrate Subcommand
//!
//! Upgrades the `details` of one business row to a newer schema version
//! and prints the migration result as JSON.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use dms_core::{EntityRef, SqlIdentifier};
use dms_migration::{DocumentStore, MigrationPipeline};
use dms_schema::SchemaStore;

use crate::print_json;
use crate::schema::{parse_code, parse_version};

/// Arguments for the migrate subcommand.
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Business table holding the row.
    #[arg(long)]
    pub table: String,

    /// Row id.
    #[arg(long)]
    pub id: i64,

    /// Schema code governing the row.
    #[arg(long)]
    pub code: String,

    /// Target version; defaults to the latest active one.
    #[arg(long = "to")]
    pub to_version: Option<i64>,
}

/// Run one migration.
pub async fn run_migrate<S: SchemaStore, D: DocumentStore, W: Write>(
    args: &MigrateArgs,
    pipeline: &MigrationPipeline<S, D>,
    out: &mut W,
) -> Result<u8> {
    let table = SqlIdentifier::new(args.table.as_str())
        .with_context(|| format!("invalid table name {:?}", args.table))?;
    let entity = EntityRef::new(table, args.id);
    let code = parse_code(&args.code)?;
    let target = args.to_version.map(parse_version).transpose()?;

    let result = pipeline.migrate_data(&entity, &code, target).await?;
    for warning in &result.warnings {
        tracing::warn!(
            version = %warning.version,
            step = warning.step_index,
            step_type = %warning.step_type,
            "{}",
            warning.message
        );
    }
    print_json(out, &result)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dms_core::{MigrationScript, MigrationStep, NewSchema, SchemaCode};
    use dms_migration::{InMemoryDocumentStore, MigrationError};
    use dms_schema::{InMemorySchemaStore, SchemaRegistry};
    use serde_json::{json, Value};

    async fn pipeline() -> MigrationPipeline<InMemorySchemaStore, InMemoryDocumentStore> {
        let registry = Arc::new(SchemaRegistry::with_default_cache(InMemorySchemaStore::new()));
        let code = SchemaCode::new("RFA_DWG_V1").unwrap();
        let table = SqlIdentifier::new("rfa_revisions").unwrap();
        registry
            .register(NewSchema::new(code.clone(), json!({"type": "object"})).with_table(table.clone()))
            .await
            .unwrap();
        registry
            .register(
                NewSchema::new(
                    code,
                    json!({"type": "object", "required": ["cost_center_code"]}),
                )
                .with_table(table.clone())
                .with_migration_script(MigrationScript::new(vec![MigrationStep::rename(
                    "cost_center",
                    "cost_center_code",
                )])),
            )
            .await
            .unwrap();

        let documents = InMemoryDocumentStore::new();
        documents.insert(
            EntityRef::new(table, 42),
            Some(json!({"cost_center": "CC-100"})),
            Some(1),
        );
        MigrationPipeline::new(registry, documents)
    }

    fn args(id: i64, to_version: Option<i64>) -> MigrateArgs {
        MigrateArgs {
            table: "rfa_revisions".into(),
            id,
            code: "RFA_DWG_V1".into(),
            to_version,
        }
    }

    #[tokio::test]
    async fn migrates_and_prints_result() {
        let pipeline = pipeline().await;
        let mut out = Vec::new();
        assert_eq!(run_migrate(&args(42, None), &pipeline, &mut out).await.unwrap(), 0);

        let result: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["fromVersion"], json!(1));
        assert_eq!(result["toVersion"], json!(2));
        assert_eq!(result["migratedFields"], json!(["cost_center_code"]));
    }

    #[tokio::test]
    async fn unknown_row_is_an_error() {
        let pipeline = pipeline().await;
        let mut out = Vec::new();
        let err = run_migrate(&args(7, Some(2)), &pipeline, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::EntityNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn bad_table_name_is_rejected_before_any_lookup() {
        let pipeline = pipeline().await;
        let mut out = Vec::new();
        let mut bad = args(42, None);
        bad.table = "rfa_revisions; DROP TABLE x".into();
        let err = run_migrate(&bad, &pipeline, &mut out).await.unwrap_err();
        assert!(err.to_string().contains("invalid table name"));
    }
}
