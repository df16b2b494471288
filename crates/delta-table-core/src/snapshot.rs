//! Resolved, immutable table state at one version.
//!
//! A [`Snapshot`] is produced by folding log entries over a base state
//! (empty, a checkpoint, or an earlier snapshot); see [`replay`]. It is never
//! mutated afterwards: resolving another version produces another snapshot,
//! and snapshots are shared behind `Arc` across concurrent readers.
//!
//! Invariant: a path is in [`Snapshot::files`] iff some `add` at or before
//! the snapshot's version created it and no later `remove` at or before that
//! version deleted it.
use std::collections::{BTreeMap, HashMap};

use arrow::datatypes::SchemaRef;

use crate::schema::{StructField, StructType};
use crate::transaction_log::{Add, Metadata, Protocol, Version};

pub mod protocol;
pub mod replay;

pub use replay::SnapshotBuilder;

/// A live data file and the version that made it live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFile {
    /// The `add` action that made the file live.
    pub add: Add,
    /// Commit version of that action (the checkpoint version for files that
    /// came from a checkpoint whose earlier commits are no longer listed).
    pub version: Version,
}

impl LiveFile {
    /// Path of the file as recorded in the log.
    pub fn path(&self) -> &str {
        &self.add.path
    }
}

/// Live files keyed by path, iterated in insertion order.
///
/// Re-adding a live path replaces its entry in place; removing and adding
/// it again moves it to the end.
#[derive(Debug, Clone, Default)]
pub struct LiveFileSet {
    order: BTreeMap<u64, LiveFile>,
    index: HashMap<String, u64>,
    next_seq: u64,
}

impl LiveFileSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for the file's path.
    pub fn insert(&mut self, file: LiveFile) {
        match self.index.get(&file.add.path) {
            Some(seq) => {
                self.order.insert(*seq, file);
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.index.insert(file.add.path.clone(), seq);
                self.order.insert(seq, file);
            }
        }
    }

    /// Remove the entry for `path`, if live.
    pub fn remove(&mut self, path: &str) -> Option<LiveFile> {
        let seq = self.index.remove(path)?;
        self.order.remove(&seq)
    }

    /// Entry for `path`.
    pub fn get(&self, path: &str) -> Option<&LiveFile> {
        self.index.get(path).and_then(|seq| self.order.get(seq))
    }

    /// Whether `path` is live.
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Number of live files.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no file is live.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Live files in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &LiveFile> {
        self.order.values()
    }
}

/// Two sets are equal when they hold the same paths with the same `add`
/// actions; insertion order and originating versions are not compared.
impl PartialEq for LiveFileSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|f| other.get(f.path()).is_some_and(|o| o.add == f.add))
    }
}

impl<'a> IntoIterator for &'a LiveFileSet {
    type Item = &'a LiveFile;
    type IntoIter = std::collections::btree_map::Values<'a, u64, LiveFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.values()
    }
}

/// Resolved table state at one version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub(crate) version: Version,
    pub(crate) metadata: Metadata,
    pub(crate) protocol: Protocol,
    pub(crate) schema: StructType,
    pub(crate) arrow_schema: SchemaRef,
    pub(crate) files: LiveFileSet,
    pub(crate) checkpoint_version: Option<Version>,
}

impl Snapshot {
    /// Version this snapshot resolves.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The `metaData` action in effect.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The `protocol` action in effect.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Effective schema after schema evolution, including partition columns.
    pub fn schema(&self) -> &StructType {
        &self.schema
    }

    /// Effective schema as Arrow.
    pub fn arrow_schema(&self) -> SchemaRef {
        self.arrow_schema.clone()
    }

    /// Partition column names, in declaration order.
    pub fn partition_columns(&self) -> &[String] {
        &self.metadata.partition_columns
    }

    /// Whether `name` is a partition column.
    pub fn is_partition_column(&self, name: &str) -> bool {
        self.metadata.partition_columns.iter().any(|c| c == name)
    }

    /// Schema fields of the partition columns, in partition order.
    pub fn partition_fields(&self) -> Vec<&StructField> {
        self.metadata
            .partition_columns
            .iter()
            .filter_map(|c| self.schema.field(c))
            .collect()
    }

    /// Live files.
    pub fn files(&self) -> &LiveFileSet {
        &self.files
    }

    /// Live file paths in iteration order.
    pub fn file_paths(&self) -> Vec<&str> {
        self.files.iter().map(LiveFile::path).collect()
    }

    /// Checkpoint version the replay that built this snapshot started from,
    /// if any (directly or through a cached snapshot).
    pub fn checkpoint_version(&self) -> Option<Version> {
        self.checkpoint_version
    }
}

/// Snapshots compare by resolved state; how they were built is ignored.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.metadata == other.metadata
            && self.protocol == other.protocol
            && self.schema == other.schema
            && self.files == other.files
    }
}
