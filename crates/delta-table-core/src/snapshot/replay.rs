//! Version resolution: replaying log entries into a [`Snapshot`].
//!
//! Resolution of version `V` is a left fold:
//!
//! 1. Pick a base: the newest of (a cached snapshot at or below `V`, the
//!    newest checkpoint at or below `V`), or the empty state.
//! 2. Read the commits `(base, V]` and apply them in version order, and
//!    within a commit in file order, with [`ReplayState::apply`].
//! 3. [`ReplayState::finish`] turns the folded state into a snapshot.
//!
//! A checkpoint base whose commits `0..=C` are all still listed takes its
//! effective schema from those commits' `metaData` history rather than from
//! the checkpoint's own `metaData`, so both bases agree on dropped columns.
//!
//! Commits may be read concurrently, but they are always applied in
//! version order, so the result does not depend on read timing or on the
//! order the backend lists files in.
use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use snafu::prelude::*;

use crate::schema::{
    merge::{self, InvalidSchemaSnafu},
    StructType,
};
use crate::snapshot::{protocol::validate_protocol, LiveFile, LiveFileSet, Snapshot};
use crate::storage::{layout, TableLocation};
use crate::table::error::{
    LogSnafu, MissingMetadataSnafu, SchemaEvolutionSnafu, TableError, VersionNotFoundSnafu,
};
use crate::transaction_log::{
    Action, CheckpointMaterializer, CheckpointState, CorruptLogSnafu, LogEntry, LogListing,
    LogSegmentReader, Metadata, Protocol, Version,
};

/// Intermediate state of the replay fold.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReplayState {
    metadata: Option<Metadata>,
    protocol: Option<Protocol>,
    schema: Option<StructType>,
    files: LiveFileSet,
    checkpoint_version: Option<Version>,
}

impl ReplayState {
    /// State before version 0.
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    /// State as of a checkpoint.
    pub(crate) fn from_checkpoint(cp: CheckpointState) -> Result<Self, TableError> {
        let version = cp.version;
        validate_protocol(&cp.protocol, Some(&cp.metadata), version)?;
        let schema = parse_schema(&cp.metadata, version)?;

        let mut files = LiveFileSet::new();
        for add in cp.adds {
            files.insert(LiveFile { add, version });
        }

        Ok(ReplayState {
            metadata: Some(cp.metadata),
            protocol: Some(cp.protocol),
            schema: Some(schema),
            files,
            checkpoint_version: Some(version),
        })
    }

    /// Re-derive the effective schema of a checkpoint state from the commits
    /// `0..=C` it summarises.
    ///
    /// A checkpoint stores only the last `metaData`, which may omit columns
    /// that replay keeps because older files holding them are still live.
    /// Folding the `metaData` history (with the live set tracked alongside
    /// for the narrowing check) yields the same schema full replay would.
    /// Live files also get back the version of the `add` that created them.
    pub(crate) fn with_history(mut self, history: &[LogEntry]) -> Result<Self, TableError> {
        let mut schema: Option<StructType> = None;
        let mut partition_columns: Option<Vec<String>> = None;
        let mut added_in: HashMap<&str, Version> = HashMap::new();

        for entry in history {
            let version = entry.version;
            let mut pending_metadata = None;
            for action in &entry.actions {
                match action {
                    Action::Add(add) => {
                        added_in.insert(add.path.as_str(), version);
                    }
                    Action::Remove(remove) => {
                        added_in.remove(remove.path.as_str());
                    }
                    Action::MetaData(metadata) => pending_metadata = Some(metadata),
                    Action::Protocol(_) => {}
                }
            }

            let Some(metadata) = pending_metadata else {
                continue;
            };
            let proposed = parse_schema(metadata, version)?;
            schema = Some(match (schema.take(), &partition_columns) {
                (Some(previous), Some(previous_partitions)) => {
                    merge::check_partition_columns(
                        previous_partitions,
                        &metadata.partition_columns,
                    )
                    .context(SchemaEvolutionSnafu { version })?;
                    let allow_narrowing = !added_in.values().any(|v| *v < version);
                    merge::merge_schema(&previous, &proposed, allow_narrowing)
                        .context(SchemaEvolutionSnafu { version })?
                }
                _ => proposed,
            });
            partition_columns = Some(metadata.partition_columns.clone());
        }

        if let Some(schema) = schema {
            self.schema = Some(schema);
        }

        let mut files = LiveFileSet::new();
        for file in &self.files {
            let version = added_in.get(file.path()).copied().unwrap_or(file.version);
            files.insert(LiveFile {
                add: file.add.clone(),
                version,
            });
        }
        self.files = files;
        Ok(self)
    }

    /// State as of an already resolved snapshot.
    pub(crate) fn from_snapshot(snapshot: &Snapshot) -> Self {
        ReplayState {
            metadata: Some(snapshot.metadata.clone()),
            protocol: Some(snapshot.protocol.clone()),
            schema: Some(snapshot.schema.clone()),
            files: snapshot.files.clone(),
            checkpoint_version: snapshot.checkpoint_version,
        }
    }

    /// Apply one commit.
    ///
    /// `add`/`remove` are applied in file order. A `metaData` action takes
    /// effect once the commit's file actions are applied (the last one wins if
    /// a commit carries several), so that an overwrite commit that removes
    /// every old file may also narrow the schema.
    pub(crate) fn apply(mut self, entry: LogEntry) -> Result<Self, TableError> {
        let version = entry.version;
        let mut pending_metadata = None;
        let mut protocol_changed = false;

        for action in entry.actions {
            match action {
                Action::Add(add) => self.files.insert(LiveFile { add, version }),
                Action::Remove(remove) => {
                    if self.files.remove(&remove.path).is_none() {
                        debug!(
                            "version {version}: remove of non-live path {}",
                            remove.path
                        );
                    }
                }
                Action::MetaData(metadata) => pending_metadata = Some(metadata),
                Action::Protocol(protocol) => {
                    self.protocol = Some(protocol);
                    protocol_changed = true;
                }
            }
        }

        let metadata_changed = pending_metadata.is_some();
        if let Some(metadata) = pending_metadata {
            self.apply_metadata(metadata, version)?;
        }

        if protocol_changed || metadata_changed {
            if let Some(protocol) = &self.protocol {
                validate_protocol(protocol, self.metadata.as_ref(), version)?;
            }
        }

        Ok(self)
    }

    fn apply_metadata(&mut self, metadata: Metadata, version: Version) -> Result<(), TableError> {
        let proposed = parse_schema(&metadata, version)?;

        let schema = match (&self.schema, &self.metadata) {
            (Some(previous), Some(previous_meta)) => {
                merge::check_partition_columns(
                    &previous_meta.partition_columns,
                    &metadata.partition_columns,
                )
                .context(SchemaEvolutionSnafu { version })?;

                let allow_narrowing = !self.files.iter().any(|f| f.version < version);
                merge::merge_schema(previous, &proposed, allow_narrowing)
                    .context(SchemaEvolutionSnafu { version })?
            }
            _ => proposed,
        };

        self.schema = Some(schema);
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Produce the snapshot for `version`.
    pub(crate) fn finish(self, version: Version) -> Result<Snapshot, TableError> {
        let metadata = self.metadata.context(MissingMetadataSnafu { version })?;
        let schema = self.schema.context(MissingMetadataSnafu { version })?;
        // Tables written before protocol actions existed are reader version 1.
        let protocol = self.protocol.unwrap_or(Protocol {
            min_reader_version: 1,
            min_writer_version: 1,
            reader_features: None,
            writer_features: None,
        });

        let arrow_schema = schema.to_arrow_schema_ref();
        Ok(Snapshot {
            version,
            metadata,
            protocol,
            schema,
            arrow_schema,
            files: self.files,
            checkpoint_version: self.checkpoint_version,
        })
    }
}

fn parse_schema(metadata: &Metadata, version: Version) -> Result<StructType, TableError> {
    let schema = StructType::from_json(&metadata.schema_string)
        .map_err(|e| {
            InvalidSchemaSnafu {
                msg: format!("cannot parse schemaString: {e}"),
            }
            .build()
        })
        .context(SchemaEvolutionSnafu { version })?;
    merge::validate_schema(&schema, &metadata.partition_columns)
        .context(SchemaEvolutionSnafu { version })?;
    Ok(schema)
}

/// Resolves versions of one table into snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    log: LogSegmentReader,
    checkpoints: CheckpointMaterializer,
    log_read_concurrency: usize,
}

impl SnapshotBuilder {
    /// Create a builder for the table at `location`, reading up to
    /// `log_read_concurrency` commit files at a time.
    pub fn new(location: TableLocation, log_read_concurrency: usize) -> Self {
        SnapshotBuilder {
            log: LogSegmentReader::new(location.clone()),
            checkpoints: CheckpointMaterializer::new(location),
            log_read_concurrency,
        }
    }

    /// The log reader used by this builder.
    pub fn log(&self) -> &LogSegmentReader {
        &self.log
    }

    /// Resolve `target` against `listing`.
    ///
    /// `cached` is an already resolved snapshot of the same table that may
    /// serve as the replay base when it is at or below `target` and not older
    /// than the checkpoint that would be used otherwise.
    pub async fn build(
        &self,
        listing: &LogListing,
        target: Version,
        cached: Option<&Arc<Snapshot>>,
    ) -> Result<Snapshot, TableError> {
        let latest = listing.latest_version().unwrap_or_default();
        let Some(earliest) = listing.earliest_reconstructable_version() else {
            return Err(CorruptLogSnafu {
                version: 0u64,
                path: format!(
                    "{}/{}",
                    self.log.location().log_dir(),
                    layout::commit_file_name(0)
                ),
                msg: "version 0 is missing and no checkpoint exists to start from",
            }
            .build())
            .context(LogSnafu);
        };
        ensure!(
            earliest <= target && target <= latest,
            VersionNotFoundSnafu {
                requested: target as i64,
                earliest,
                latest,
            }
        );

        let checkpoint = CheckpointMaterializer::select(listing, target);
        let checkpoint_version = checkpoint.map(|c| c.version);
        let cached = cached.filter(|s| {
            s.version <= target && checkpoint_version.map_or(true, |cp| s.version >= cp)
        });

        let (state, after) = match (cached, checkpoint) {
            (Some(snapshot), _) => {
                debug!(
                    "resolving version {target} from cached version {}",
                    snapshot.version
                );
                (ReplayState::from_snapshot(snapshot), Some(snapshot.version))
            }
            (None, Some(files)) => {
                debug!(
                    "resolving version {target} from checkpoint {}",
                    files.version
                );
                let cp = self
                    .checkpoints
                    .materialize(files)
                    .await
                    .context(LogSnafu)?;
                let mut state = ReplayState::from_checkpoint(cp)?;
                if listing.has_commits_through(files.version) {
                    let history = self
                        .log
                        .read_entries(listing, None, files.version, self.log_read_concurrency)
                        .await
                        .context(LogSnafu)?;
                    state = state.with_history(&history)?;
                } else {
                    debug!(
                        "commits before checkpoint {} are gone, using its metaData schema",
                        files.version
                    );
                }
                (state, Some(files.version))
            }
            (None, None) => {
                debug!("resolving version {target} from version 0");
                (ReplayState::empty(), None)
            }
        };

        let entries = self
            .log
            .read_entries(listing, after, target, self.log_read_concurrency)
            .await
            .context(LogSnafu)?;

        let state = entries.into_iter().try_fold(state, ReplayState::apply)?;
        state.finish(target)
    }
}
