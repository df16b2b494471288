//! Error types and SNAFU context selectors for `table`.
//!
//! This module centralizes the `TableError` enum used by the public API and
//! exposes context selectors (via `#[snafu(visibility(pub(crate)))]`) so the
//! snapshot, file index and scan modules can attach context without
//! re-exporting everything at the crate root.
//!
//! None of these errors are retried internally: they describe either a
//! malformed persisted artifact or a caller mistake. Storage failures are
//! passed through as-is.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::prelude::*;

use crate::{
    schema::SchemaEvolutionError,
    storage::StorageError,
    transaction_log::{LogError, Version},
};

/// Errors from table resolution and scanning.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// Listing or decoding the transaction log failed (no log, corrupt
    /// commit, undecodable checkpoint, storage failure).
    #[snafu(display("Transaction log error: {source}"))]
    Log {
        /// Underlying transaction log error.
        #[snafu(source, backtrace)]
        source: LogError,
    },

    /// The requested version is negative, newer than the latest commit, or
    /// older than the oldest version that can still be reconstructed.
    #[snafu(display(
        "Version {requested} not found; available versions are {earliest}..={latest}"
    ))]
    VersionNotFound {
        /// Version requested by the caller.
        requested: i64,
        /// Oldest reconstructable version.
        earliest: Version,
        /// Latest committed version.
        latest: Version,
    },

    /// A `metaData` action could not be applied to the effective schema.
    #[snafu(display("Schema evolution error at version {version}: {source}"))]
    SchemaEvolution {
        /// Version of the offending `metaData` action.
        version: Version,
        /// Underlying schema error.
        #[snafu(source)]
        source: SchemaEvolutionError,
    },

    /// The table requires reader features this crate does not implement.
    #[snafu(display("Unsupported protocol at version {version}: {msg}"))]
    UnsupportedProtocol {
        /// Version of the offending `protocol` (or `metaData`) action.
        version: Version,
        /// Which requirement is not met.
        msg: String,
    },

    /// No `metaData` action exists at or before the resolved version.
    #[snafu(display("No metaData action found in log up to version {version}"))]
    MissingMetadata {
        /// The version being resolved.
        version: Version,
    },

    /// A projection or filter names a column the snapshot does not have.
    #[snafu(display("Unknown column {column}"))]
    UnknownColumn {
        /// The column name as given by the caller.
        column: String,
    },

    /// A partition predicate references a column that is not a partition
    /// column; such filters must go through residual row filtering.
    #[snafu(display("Partition predicate references non-partition column {column}"))]
    PartitionPredicate {
        /// The offending column.
        column: String,
    },

    /// A filter cannot be evaluated against the column types it references.
    #[snafu(display("Invalid predicate: {msg}"))]
    InvalidPredicate {
        /// A description of the problem.
        msg: String,
    },

    /// A live file records a partition value that does not parse as the
    /// partition column's type.
    #[snafu(display("Invalid value {value:?} for partition column {column} in {path}"))]
    InvalidPartitionValue {
        /// Partition column.
        column: String,
        /// Raw value from the log.
        value: String,
        /// File carrying the value.
        path: String,
    },

    /// A data file column cannot be converted to the effective column type.
    #[snafu(display(
        "Column {column} in {path} has type {found}, which cannot be read as {expected}"
    ))]
    IncompatibleFileColumn {
        /// Data file path.
        path: String,
        /// Column name.
        column: String,
        /// Physical type in the file.
        found: String,
        /// Effective type from the table schema.
        expected: String,
    },

    /// Storage error while reading data files.
    #[snafu(display("Storage error while accessing table data: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// Parquet decode error while scanning a data file.
    #[snafu(display("Parquet read error in {path}: {source}"))]
    ParquetRead {
        /// Data file path.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Arrow compute or conversion error while materializing or filtering batches.
    #[snafu(display("Arrow error while processing batches: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}
