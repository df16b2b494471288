use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    sync::{PoisonError, RwLock},
};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::prelude::*;

use crate::storage::{BackendError, NotFoundSnafu, StorageBackend, StorageResult};

/// In-memory backend keyed by full path.
///
/// Directories are implicit: `list(dir)` returns the distinct first path
/// segment of every key under `dir/`. Listing order is deliberately reversed
/// relative to key order so that callers cannot accidentally depend on it.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    files: RwLock<BTreeMap<String, Bytes>>,
}

impl InMemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the file at `path`.
    pub fn put(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files.insert(path.into(), data.into());
    }

    /// Remove the file at `path`, returning whether it existed.
    pub fn delete(&self, path: &str) -> bool {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files.remove(path).is_some()
    }
}

fn not_found(path: &str) -> BackendError {
    BackendError::Local(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no entry at {path}"),
    ))
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn list(&self, dir: &str) -> StorageResult<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);

        let names: BTreeSet<&str> = files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .collect();

        if names.is_empty() {
            return Err(not_found(dir)).context(NotFoundSnafu { path: dir });
        }
        Ok(names.into_iter().rev().map(str::to_string).collect())
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        match files.get(path) {
            Some(b) => Ok(b.clone()),
            None => Err(not_found(path)).context(NotFoundSnafu { path }),
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        if files.contains_key(path) {
            return Ok(true);
        }
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix)))
    }
}
