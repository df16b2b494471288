//! Error types for storage backends.

use std::{error::Error, fmt, io};

use snafu::{Backtrace, prelude::*};

/// Errors produced by a storage backend implementation.
///
/// Backend-specific failures are wrapped here unmodified so higher layers can
/// attach path context without losing the original error.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
    /// An error raised by a caller-provided backend (object stores, etc.).
    External(Box<dyn Error + Send + Sync + 'static>),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
            BackendError::External(e) => write!(f, "backend error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
            BackendError::External(e) => Some(e.as_ref()),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// Any other backend failure (permissions, network, short reads, ...).
    #[snafu(display("I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the error occurred.
        path: String,
        /// Underlying backend error with backend-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The table root string names a scheme no registered backend handles.
    #[snafu(display("Invalid table location {spec:?}: {reason}"))]
    InvalidLocation {
        /// The location string supplied by the caller.
        spec: String,
        /// Why the location was rejected.
        reason: String,
    },
}

impl StorageError {
    /// True when the error reports a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
