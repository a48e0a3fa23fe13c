//! # dms CLI entry point
//!
//! Parses command-line arguments, connects to MariaDB, and dispatches to
//! the subcommand handlers in the library crate.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dms_cli::columns::{run_columns, ColumnsArgs};
use dms_cli::config::GlobalConfig;
use dms_cli::document::{run_encrypt, run_read, run_validate, EncryptArgs, ReadArgs, ValidateArgs};
use dms_cli::migrate::{run_migrate, MigrateArgs};
use dms_cli::schema::{run_schema, SchemaArgs};
use dms_db::{init_pool, MySqlCatalog, MySqlDocumentStore, MySqlSchemaStore};
use dms_migration::MigrationPipeline;
use dms_projection::VirtualColumnProjector;
use dms_schema::SchemaRegistry;

/// Document schema engine administration.
///
/// Registers versioned JSON schemas, validates and encrypts documents,
/// migrates stored rows between schema versions, and keeps generated
/// columns in sync with schema declarations.
#[derive(Parser, Debug)]
#[command(name = "dms", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    config: GlobalConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Schema registration and lifecycle.
    Schema(SchemaArgs),

    /// Validate a document against a schema.
    Validate(ValidateArgs),

    /// Validate a document and encrypt its x-encrypt fields.
    Encrypt(EncryptArgs),

    /// Decrypt and role-filter a stored document.
    Read(ReadArgs),

    /// Upgrade one business row to a newer schema version.
    Migrate(MigrateArgs),

    /// Virtual column projection.
    Columns(ColumnsArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?cli.config, "dms CLI starting");

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let pool = init_pool(&cli.config.db_config()?).await?;
    let registry = Arc::new(SchemaRegistry::with_default_cache(MySqlSchemaStore::new(
        pool.clone(),
    )));
    let mut out = std::io::stdout();

    match cli.command {
        Commands::Schema(args) => run_schema(&args, &*registry, &mut out).await,
        Commands::Validate(args) => run_validate(&args, &*registry, &mut out).await,
        Commands::Encrypt(args) => {
            let processor = cli.config.processor()?;
            run_encrypt(&args, &*registry, &processor, &mut out).await
        }
        Commands::Read(args) => {
            let processor = cli.config.processor()?;
            run_read(&args, &*registry, &processor, &mut out).await
        }
        Commands::Migrate(args) => {
            let pipeline = MigrationPipeline::new(registry, MySqlDocumentStore::new(pool));
            run_migrate(&args, &pipeline, &mut out).await
        }
        Commands::Columns(args) => {
            let projector = VirtualColumnProjector::new(MySqlCatalog::new(pool));
            run_columns(&args, &*registry, &projector, &mut out).await
        }
    }
}
