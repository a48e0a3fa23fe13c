//! # Document Subcommands
//!
//! `validate`, `encrypt`, and `read` operate on a single document file
//! and never touch business tables. `encrypt` prints what the application
//! would store; `read` prints what a caller holding `--role` would see.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use dms_core::SecurityContext;
use dms_schema::{FieldSecurityProcessor, SchemaError, SchemaRegistry, SchemaStore};

use crate::input::load_value;
use crate::print_json;
use crate::schema::{parse_code, parse_version};

/// Arguments for the validate subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Schema code.
    pub code: String,

    /// Document to validate (JSON or YAML).
    pub document: PathBuf,

    /// Validate against this version instead of the latest active one.
    #[arg(long)]
    pub version: Option<i64>,
}

/// Arguments for the encrypt subcommand.
#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Schema code.
    pub code: String,

    /// Plaintext document (JSON or YAML).
    pub document: PathBuf,
}

/// Arguments for the read subcommand.
#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Schema code.
    pub code: String,

    /// Stored (encrypted) document (JSON or YAML).
    pub document: PathBuf,

    /// Role held by the reader. Repeat for several roles.
    #[arg(long = "role")]
    pub roles: Vec<String>,
}

/// Validate a document. Violations are printed one per line and yield
/// exit code 1.
pub async fn run_validate<S: SchemaStore, W: Write>(
    args: &ValidateArgs,
    registry: &SchemaRegistry<S>,
    out: &mut W,
) -> Result<u8> {
    let code = parse_code(&args.code)?;
    let data = load_value(&args.document)?;
    let outcome = match args.version {
        Some(v) => registry.validate_version(&code, parse_version(v)?, &data).await,
        None => registry.validate(&code, &data).await,
    };
    match outcome {
        Ok(_) => {
            writeln!(out, "OK: {} is valid against {code}", args.document.display())?;
            Ok(0)
        }
        Err(err @ SchemaError::ValidationFailed { .. }) => {
            writeln!(out, "FAIL: {err}")?;
            if let Some(violations) = err.violations() {
                for message in violations.messages() {
                    writeln!(out, "  - {message}")?;
                }
            }
            Ok(1)
        }
        Err(err) => Err(err.into()),
    }
}

/// Validate then encrypt a document, printing the storable form.
pub async fn run_encrypt<S: SchemaStore, W: Write>(
    args: &EncryptArgs,
    registry: &SchemaRegistry<S>,
    processor: &FieldSecurityProcessor,
    out: &mut W,
) -> Result<u8> {
    let code = parse_code(&args.code)?;
    let data = load_value(&args.document)?;
    let stored = registry.process_write_data(&code, &data, processor).await?;
    print_json(out, &stored)?;
    Ok(0)
}

/// Decrypt and role-filter a stored document.
pub async fn run_read<S: SchemaStore, W: Write>(
    args: &ReadArgs,
    registry: &SchemaRegistry<S>,
    processor: &FieldSecurityProcessor,
    out: &mut W,
) -> Result<u8> {
    let code = parse_code(&args.code)?;
    let data = load_value(&args.document)?;
    let ctx = SecurityContext::new(args.roles.iter().cloned());
    let visible = registry.process_read_data(&code, &data, &ctx, processor).await?;
    print_json(out, &visible)?;
    Ok(0)
}
