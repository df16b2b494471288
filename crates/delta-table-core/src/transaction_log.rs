//! Read side of the append-only transaction log.
//!
//! A table's history lives under `<root>/_delta_log/`:
//!
//! ```text
//! table_root/
//!   _delta_log/
//!     00000000000000000000.json              # commit, version 0
//!     00000000000000000001.json              # commit, version 1
//!     ...
//!     00000000000000000010.checkpoint.parquet
//!     00000000000000000010.json
//!     00000000000000000011.json
//!     _last_checkpoint                       # {"version":10,"size":13}
//!   number2=0/part-00000-....parquet         # data files (partitioned)
//! ```
//!
//! Each commit file holds one JSON object per line, each object a single
//! action keyed by its kind:
//!
//! ```json
//! {"protocol":{"minReaderVersion":1,"minWriterVersion":2}}
//! {"metaData":{"id":"...","format":{"provider":"parquet","options":{}},"schemaString":"...","partitionColumns":["number2"],"configuration":{}}}
//! {"add":{"path":"number2=0/part-0.parquet","partitionValues":{"number2":"0"},"size":512,"modificationTime":1,"dataChange":true}}
//! ```
//!
//! - [`actions`] is the typed action model.
//! - [`log_path`] parses file names found in the log directory.
//! - [`log_segment`] lists the log and decodes commit files.
//! - [`checkpoint`] decodes Parquet checkpoints into the same action model.
//!
//! Nothing here caches file contents; caching of resolved state belongs to
//! the table.

pub mod actions;
pub mod checkpoint;
pub mod log_path;
pub mod log_segment;

pub use actions::{Action, Add, FileStats, Format, Metadata, Protocol, Remove};
pub use checkpoint::{CheckpointMaterializer, CheckpointState};
pub use log_path::{LogFileKind, ParsedLogPath};
pub use log_segment::{CheckpointFiles, LastCheckpointHint, LogEntry, LogListing, LogSegmentReader};

use snafu::{Backtrace, prelude::*};

use crate::storage::StorageError;

/// Table version number. Versions start at 0 and increase by one per commit.
pub type Version = u64;

/// Errors that can occur while listing or decoding the transaction log.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LogError {
    /// There is no transaction log under the table root.
    #[snafu(display("No transaction log found at {log_path}"))]
    LogNotFound {
        /// The log directory that was probed.
        log_path: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A commit file (or a name in the log directory) is malformed, or a
    /// commit needed for replay is missing.
    #[snafu(display("Corrupt log entry for version {version} at {path}: {msg}"))]
    CorruptLog {
        /// The version the problem belongs to.
        version: Version,
        /// The file that could not be decoded (or was expected).
        path: String,
        /// A description of the problem.
        msg: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// A checkpoint file could not be decoded into actions.
    #[snafu(display("Failed to decode checkpoint for version {version} at {path}: {msg}"))]
    CheckpointDecode {
        /// Checkpoint version.
        version: Version,
        /// The checkpoint file that failed.
        path: String,
        /// A description of the problem.
        msg: String,
        /// Backtrace for debugging.
        backtrace: Backtrace,
    },

    /// Underlying storage error while reading the log.
    ///
    /// Backtraces are delegated to the inner StorageError.
    #[snafu(display("Storage error while reading transaction log: {source}"))]
    Storage {
        /// Underlying storage error returned by the storage backend.
        #[snafu(backtrace)]
        source: StorageError,
    },
}
