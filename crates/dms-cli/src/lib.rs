//! # dms-cli: Document Schema Engine Command-Line Interface
//!
//! Operator tooling over the schema registry, the field security
//! processor, the migration pipeline, and the virtual column projector.
//!
//! ## Subcommands
//!
//! - `schema`: register, list, show, activate, and deactivate schema versions
//! - `validate`: check a document against the latest or a pinned version
//! - `encrypt`: validate a document and encrypt its `x-encrypt` fields
//! - `read`: decrypt and role-filter a stored document
//! - `migrate`: upgrade one business row to a newer schema version
//! - `columns`: project a schema's virtual columns onto its table
//!
//! ## Crate Policy
//!
//! - Argument parsing is separated from business logic.
//! - Handlers are generic over the store traits and write to any
//!   `io::Write`, so they run against in-memory backends in tests. Only
//!   `main.rs` knows about MariaDB.
//! - Handlers return a process exit code: 0 for success, 1 when the
//!   operation ran but reported a failure (e.g. an invalid document).

pub mod columns;
pub mod config;
pub mod document;
pub mod input;
pub mod migrate;
pub mod schema;

use std::io::Write;

use serde::Serialize;

/// Write `value` as pretty-printed JSON followed by a newline.
pub fn print_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
