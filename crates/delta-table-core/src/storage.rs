//! Storage backends and path utilities.
//!
//! The engine only ever reads. Everything it needs from a backend is captured
//! by [`StorageBackend`]: list the entry names of a directory, read a file's
//! bytes, and test whether a path exists. Backends are expected to be strongly
//! consistent for committed log entries; failures are surfaced unmodified as
//! [`StorageError`] and never retried here.
//!
//! Two backends ship with the crate:
//!
//! - [`LocalFileSystem`]: `tokio::fs` over a local directory tree.
//! - [`InMemoryStorage`]: a map of path to bytes, useful for tests and for
//!   embedding callers that already hold the log in memory.
//!
//! [`TableLocation`] pairs a table root with the backend that serves it, and
//! [`layout`] holds the fixed naming conventions under `_delta_log/`.

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

pub mod error;
pub mod layout;
mod local;
mod memory;
mod table_location;

pub use error::{BackendError, StorageError};
pub(crate) use error::{InvalidLocationSnafu, NotFoundSnafu, OtherIoSnafu};
pub use local::LocalFileSystem;
pub use memory::InMemoryStorage;
pub use table_location::TableLocation;

/// General result type used by storage operations.
///
/// This aliases `Result<T, StorageError>` so functions in this module can
/// return a concise result type while still communicating storage-specific
/// error information via `StorageError`.
pub type StorageResult<T> = Result<T, StorageError>;

/// Read-only view of a storage system holding one or more tables.
///
/// Paths are plain `/`-separated strings as produced by
/// [`TableLocation::join`]; a backend decides how to map them onto its own
/// namespace.
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// Names (not full paths) of the direct children of `dir`.
    ///
    /// The order of the returned names is unspecified; callers sort.
    /// A missing directory is [`StorageError::NotFound`].
    async fn list(&self, dir: &str) -> StorageResult<Vec<String>>;

    /// Full contents of the file at `path`.
    async fn read(&self, path: &str) -> StorageResult<Bytes>;

    /// Whether a file or directory exists at `path`.
    async fn exists(&self, path: &str) -> StorageResult<bool>;
}
