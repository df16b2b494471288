use std::{io, path::Path};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::prelude::*;
use tokio::fs;

use crate::storage::{BackendError, NotFoundSnafu, OtherIoSnafu, StorageBackend, StorageResult};

/// Backend over the local filesystem.
///
/// Paths handed to this backend are interpreted as filesystem paths as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Create a local filesystem backend.
    pub fn new() -> Self {
        LocalFileSystem
    }
}

fn io_context<T>(res: io::Result<T>, path: &str) -> StorageResult<T> {
    match res {
        Ok(v) => Ok(v),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(BackendError::Local(e)).context(NotFoundSnafu { path })
        }
        Err(e) => Err(BackendError::Local(e)).context(OtherIoSnafu { path }),
    }
}

#[async_trait]
impl StorageBackend for LocalFileSystem {
    async fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        let mut rd = io_context(fs::read_dir(Path::new(dir)).await, dir)?;
        let mut names = Vec::new();
        while let Some(entry) = io_context(rd.next_entry().await, dir)? {
            // Non UTF-8 names can never be log entries.
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let data = io_context(fs::read(Path::new(path)).await, path)?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        io_context(fs::try_exists(Path::new(path)).await, path)
    }
}
