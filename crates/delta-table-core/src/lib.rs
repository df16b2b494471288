//! Read-side engine for log-structured, versioned tables in the Delta layout.
//!
//! Writers append immutable Parquet data files and JSON commit files under
//! `<root>/_delta_log/`; this crate never writes. Given a table root it:
//!
//! - Lists and decodes the transaction log and its Parquet checkpoints
//!   (`transaction_log` module).
//! - Replays actions from the nearest checkpoint (or a cached snapshot) up to
//!   a requested version, producing an immutable [`snapshot::Snapshot`] with
//!   the live file set, the effective schema and the partition layout
//!   (`snapshot` and `schema` modules).
//! - Prunes live files by partition values and file statistics
//!   (`file_index` module) and splits caller filters into partition and
//!   residual parts (`scan` module).
//! - Exposes all of the above through [`DeltaTable`] (`table` module).
//!
//! Storage access goes through the [`storage::StorageBackend`] trait; a local
//! filesystem backend and an in-memory backend ship with the crate.
#![deny(missing_docs)]

pub mod expression;
pub mod file_index;
pub mod scan;
pub mod schema;
pub mod snapshot;
pub mod storage;
pub mod table;
pub mod transaction_log;

#[cfg(test)]
pub(crate) mod test_util;

pub use expression::{col, ComparisonOp, Predicate, Scalar};
pub use scan::{Projection, ScanResult};
pub use snapshot::Snapshot;
pub use storage::TableLocation;
pub use table::{DeltaTable, TableConfig, TableError};
pub use transaction_log::Version;
