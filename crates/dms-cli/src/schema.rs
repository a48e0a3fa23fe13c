//! # Schema Subcommand
//!
//! Registration and lifecycle of versioned schemas.
//!
//! `register` takes a manifest (JSON or YAML) shaped like:
//!
//! ```yaml
//! code: RFA_DWG_V1
//! tableName: rfa_revisions
//! definition: { type: object, properties: { ... } }
//! migrationScript: { steps: [ ... ] }
//! virtualColumns: [ ... ]
//! ```
//!
//! Only `code` and `definition` are required. Each registration inserts
//! the next version of the code.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use dms_core::{NewSchema, SchemaCode, SchemaFilter, SchemaVersion, SqlIdentifier};
use dms_schema::{SchemaRegistry, SchemaStore};
use serde_json::Value;

use crate::input::load_value;
use crate::print_json;

/// Arguments for the schema subcommand.
#[derive(Args, Debug)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommand,
}

/// Schema operations.
#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Register a manifest as the next version of its code.
    Register {
        /// Path to the manifest (JSON or YAML).
        manifest: PathBuf,
    },

    /// List schema versions.
    List {
        /// Only codes containing this text (case-insensitive).
        #[arg(long)]
        code_contains: Option<String>,

        /// Only active (`true`) or inactive (`false`) versions.
        #[arg(long)]
        active: Option<bool>,
    },

    /// Print one schema version.
    Show {
        /// Schema code.
        code: String,

        /// Exact version; defaults to the latest active one.
        #[arg(long)]
        version: Option<i64>,
    },

    /// Exclude a version from "latest" resolution.
    Deactivate {
        /// Schema code.
        code: String,

        /// Version to deactivate.
        #[arg(long)]
        version: i64,
    },

    /// Make a deactivated version eligible for "latest" again.
    Activate {
        /// Schema code.
        code: String,

        /// Version to activate.
        #[arg(long)]
        version: i64,
    },
}

/// Execute a schema subcommand.
pub async fn run_schema<S: SchemaStore, W: Write>(
    args: &SchemaArgs,
    registry: &SchemaRegistry<S>,
    out: &mut W,
) -> Result<u8> {
    match &args.command {
        SchemaCommand::Register { manifest } => {
            let raw = load_value(manifest)?;
            let new = parse_manifest::<S>(raw)
                .with_context(|| format!("invalid schema manifest {}", manifest.display()))?;
            let stored = registry.register(new).await?;
            print_json(out, &stored)?;
        }
        SchemaCommand::List {
            code_contains,
            active,
        } => {
            let filter = SchemaFilter {
                code_contains: code_contains.clone(),
                active: *active,
            };
            let rows = registry.find_all(&filter).await?;
            for row in &rows {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    row.code,
                    row.version,
                    row.table_name.as_ref().map(SqlIdentifier::as_str).unwrap_or("-"),
                    if row.is_active { "active" } else { "inactive" },
                )?;
            }
            tracing::info!(count = rows.len(), "listed schemas");
        }
        SchemaCommand::Show { code, version } => {
            let code = parse_code(code)?;
            let row = match version {
                Some(v) => {
                    registry
                        .find_one_by_code_and_version(&code, parse_version(*v)?)
                        .await?
                }
                None => registry.find_latest_by_code(&code).await?,
            };
            print_json(out, &row)?;
        }
        SchemaCommand::Deactivate { code, version } => {
            let row = registry
                .deactivate(&parse_code(code)?, parse_version(*version)?)
                .await?;
            writeln!(out, "{} {} deactivated", row.code, row.version)?;
        }
        SchemaCommand::Activate { code, version } => {
            let row = registry
                .activate(&parse_code(code)?, parse_version(*version)?)
                .await?;
            writeln!(out, "{} {} activated", row.code, row.version)?;
        }
    }
    Ok(0)
}

/// Build a [`NewSchema`] from a raw manifest. The migration script goes
/// through the registry's shape check so a script without a `steps` array
/// is reported as such.
fn parse_manifest<S: SchemaStore>(mut raw: Value) -> Result<NewSchema> {
    let script = raw.as_object_mut().and_then(|m| m.remove("migrationScript"));
    let mut new: NewSchema = serde_json::from_value(raw)?;
    if let Some(script) = script.filter(|s| !s.is_null()) {
        new.migration_script = Some(SchemaRegistry::<S>::parse_migration_script(&new.code, &script)?);
    }
    Ok(new)
}

pub(crate) fn parse_code(code: &str) -> Result<SchemaCode> {
    SchemaCode::new(code).with_context(|| format!("invalid schema code {code:?}"))
}

pub(crate) fn parse_version(version: i64) -> Result<SchemaVersion> {
    SchemaVersion::new(version).with_context(|| format!("invalid schema version {version}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dms_schema::InMemorySchemaStore;
    use serde_json::json;

    fn registry() -> SchemaRegistry<InMemorySchemaStore> {
        SchemaRegistry::with_default_cache(InMemorySchemaStore::new())
    }

    fn manifest(dir: &tempfile::TempDir, body: &Value) -> PathBuf {
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, serde_json::to_vec(body).unwrap()).unwrap();
        path
    }

    async fn run(registry: &SchemaRegistry<InMemorySchemaStore>, command: SchemaCommand) -> String {
        let mut out = Vec::new();
        let code = run_schema(&SchemaArgs { command }, registry, &mut out)
            .await
            .unwrap();
        assert_eq!(code, 0);
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn register_twice_bumps_the_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = manifest(
            &dir,
            &json!({
                "code": "RFA_DWG_V1",
                "tableName": "rfa_revisions",
                "definition": {"type": "object"}
            }),
        );
        let reg = registry();

        let first: Value = serde_json::from_str(
            &run(&reg, SchemaCommand::Register { manifest: path.clone() }).await,
        )
        .unwrap();
        assert_eq!(first["version"], json!(1));

        let second: Value =
            serde_json::from_str(&run(&reg, SchemaCommand::Register { manifest: path }).await)
                .unwrap();
        assert_eq!(second["version"], json!(2));
        assert_eq!(second["tableName"], json!("rfa_revisions"));
    }

    #[tokio::test]
    async fn manifest_migration_script_must_have_steps() {
        let dir = tempfile::tempdir().unwrap();
        let path = manifest(
            &dir,
            &json!({
                "code": "RFA_DWG_V1",
                "definition": {"type": "object"},
                "migrationScript": {"rename": "a"}
            }),
        );
        let reg = registry();
        let mut out = Vec::new();
        let err = run_schema(
            &SchemaArgs {
                command: SchemaCommand::Register { manifest: path },
            },
            &reg,
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("steps"));
        assert!(reg.store().is_empty());
    }

    #[tokio::test]
    async fn list_show_and_toggle() {
        let reg = registry();
        let code = SchemaCode::new("RFA_DWG_V1").unwrap();
        reg.create_or_update(code.clone(), json!({"type": "object"}))
            .await
            .unwrap();
        reg.create_or_update(code.clone(), json!({"type": "object", "required": ["a"]}))
            .await
            .unwrap();

        let listing = run(
            &reg,
            SchemaCommand::List {
                code_contains: Some("rfa".into()),
                active: None,
            },
        )
        .await;
        assert_eq!(listing.lines().count(), 2);
        assert!(listing.contains("RFA_DWG_V1\tv2\t-\tactive"));

        let out = run(
            &reg,
            SchemaCommand::Deactivate {
                code: "RFA_DWG_V1".into(),
                version: 2,
            },
        )
        .await;
        assert_eq!(out.trim(), "RFA_DWG_V1 v2 deactivated");

        let latest: Value = serde_json::from_str(
            &run(
                &reg,
                SchemaCommand::Show {
                    code: "RFA_DWG_V1".into(),
                    version: None,
                },
            )
            .await,
        )
        .unwrap();
        assert_eq!(latest["version"], json!(1));

        run(
            &reg,
            SchemaCommand::Activate {
                code: "RFA_DWG_V1".into(),
                version: 2,
            },
        )
        .await;
        assert_eq!(reg.find_latest_by_code(&code).await.unwrap().version.get(), 2);
    }

    #[tokio::test]
    async fn show_unknown_code_fails() {
        let reg = registry();
        let mut out = Vec::new();
        let err = run_schema(
            &SchemaArgs {
                command: SchemaCommand::Show {
                    code: "NOPE".into(),
                    version: Some(3),
                },
            },
            &reg,
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("schema not found"));
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        assert!(parse_code("bad code").is_err());
        assert!(parse_version(0).is_err());
        assert_eq!(parse_version(2).unwrap().get(), 2);
    }
}
