//! # DDL Statements
//!
//! Structured form of the two statements the projector issues. Catalogs
//! receive the structured value; [`DdlStatement::to_sql`] renders the
//! MariaDB text.
//!
//! Every interpolated name is a [`SqlIdentifier`] and every path a
//! [`JsonPath`], both validated at construction, so rendering cannot
//! produce a statement that escapes its quoting.

use std::fmt;

use dms_core::{ColumnDataType, IndexType, JsonPath, SqlIdentifier};

/// Name of the JSON payload column every governed table exposes.
pub const DETAILS_COLUMN: &str = "details";

/// Kind of index created over a virtual column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Plain secondary index.
    Plain,
    /// `UNIQUE` index.
    Unique,
}

impl IndexKind {
    /// Index kind for a configured index type; `None` when no index is wanted.
    ///
    /// InnoDB cannot build a `FULLTEXT` index over a virtual generated
    /// column, so a `FULLTEXT` request gets a plain secondary index.
    pub fn for_index_type(index_type: IndexType) -> Option<Self> {
        match index_type {
            IndexType::None => None,
            IndexType::Index | IndexType::Fulltext => Some(Self::Plain),
            IndexType::Unique => Some(Self::Unique),
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Plain => "INDEX",
            Self::Unique => "UNIQUE INDEX",
        }
    }
}

/// SQL column type for a logical data type. Total: unknown types map to
/// `VARCHAR(255)`.
pub fn sql_type(data_type: &ColumnDataType) -> &'static str {
    match data_type {
        ColumnDataType::Int => "INT",
        ColumnDataType::Varchar => "VARCHAR(255)",
        ColumnDataType::Boolean => "TINYINT(1)",
        ColumnDataType::Date => "DATE",
        ColumnDataType::Datetime => "DATETIME",
        ColumnDataType::Decimal => "DECIMAL(10,2)",
        ColumnDataType::Other(_) => "VARCHAR(255)",
    }
}

/// A schema change against a governed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    /// Add a generated column extracted from `details`.
    AddVirtualColumn {
        /// Target table.
        table: SqlIdentifier,
        /// New column.
        column: SqlIdentifier,
        /// Rendered column type, from [`sql_type`].
        sql_type: &'static str,
        /// Path into `details`.
        json_path: JsonPath,
    },
    /// Create an index over one column.
    CreateIndex {
        /// Target table.
        table: SqlIdentifier,
        /// Index name, `idx_<table>_<column>`.
        index: SqlIdentifier,
        /// Indexed column.
        column: SqlIdentifier,
        /// Index kind.
        kind: IndexKind,
    },
}

impl DdlStatement {
    /// Table the statement alters.
    pub fn table(&self) -> &SqlIdentifier {
        match self {
            Self::AddVirtualColumn { table, .. } | Self::CreateIndex { table, .. } => table,
        }
    }

    /// MariaDB statement text.
    pub fn to_sql(&self) -> String {
        match self {
            Self::AddVirtualColumn {
                table,
                column,
                sql_type,
                json_path,
            } => format!(
                "ALTER TABLE {table} ADD COLUMN {column} {sql_type} GENERATED ALWAYS AS \
                 (JSON_UNQUOTE(JSON_EXTRACT({DETAILS_COLUMN}, '{json_path}'))) VIRTUAL"
            ),
            Self::CreateIndex {
                table,
                index,
                column,
                kind,
            } => format!("CREATE {} {index} ON {table} ({column})", kind.keyword()),
        }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}
