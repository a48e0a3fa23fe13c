//! # dms-projection: Virtual Column Projection
//!
//! Exposes JSON paths inside a table's `details` column as generated
//! columns so they can be indexed and queried like ordinary columns.
//!
//! The projector issues structured [`DdlStatement`]s through a [`Catalog`];
//! it holds no state of its own and takes no locks. Projection is an
//! administrative operation.

pub mod catalog;
pub mod ddl;
pub mod error;
pub mod projector;

pub use catalog::{Catalog, InMemoryCatalog};
pub use ddl::{sql_type, DdlStatement, IndexKind, DETAILS_COLUMN};
pub use error::ProjectionError;
pub use projector::{index_name, ProjectionReport, VirtualColumnProjector};
