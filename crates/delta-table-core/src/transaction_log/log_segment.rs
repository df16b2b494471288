//! Listing of the log directory and decoding of commit files.
//!
//! [`LogSegmentReader::list`] turns a (possibly unordered) directory listing
//! into a [`LogListing`]: the set of commit versions plus the complete
//! checkpoints available per version. Ordering downstream depends only on
//! the version numbers encoded in file names, never on listing order.
use std::collections::{BTreeMap, BTreeSet};

use futures::{stream, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use snafu::prelude::*;

use crate::storage::{layout, StorageError, TableLocation};
use crate::transaction_log::{
    actions::{parse_action_line, Action},
    log_path::{LogFileKind, ParsedLogPath},
    CorruptLogSnafu, LogError, LogNotFoundSnafu, StorageSnafu, Version,
};

/// One table version: the actions committed at that version, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Commit version.
    pub version: Version,
    /// Actions in the order they were written.
    pub actions: Vec<Action>,
}

/// The files making up one complete checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointFiles {
    /// Version the checkpoint materialises.
    pub version: Version,
    /// Backend paths of the checkpoint parts, in part order.
    pub paths: Vec<String>,
}

/// Contents of `_delta_log/_last_checkpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LastCheckpointHint {
    /// Version of the most recent checkpoint when the hint was written.
    pub version: Version,
    /// Number of actions in that checkpoint.
    #[serde(default)]
    pub size: Option<i64>,
    /// Number of parts, absent for single-part checkpoints.
    #[serde(default)]
    pub parts: Option<u32>,
}

/// Versions available in the log directory at listing time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogListing {
    commits: BTreeSet<Version>,
    checkpoints: BTreeMap<Version, CheckpointFiles>,
}

impl LogListing {
    /// Highest version that has either a commit or a checkpoint.
    pub fn latest_version(&self) -> Option<Version> {
        let commit = self.commits.last().copied();
        let checkpoint = self.checkpoints.keys().next_back().copied();
        commit.max(checkpoint)
    }

    /// Lowest version that can be resolved: 0 if the first commit is still
    /// present, otherwise the oldest checkpoint.
    pub fn earliest_reconstructable_version(&self) -> Option<Version> {
        if self.commits.contains(&0) {
            return Some(0);
        }
        self.checkpoints.keys().next().copied()
    }

    /// The checkpoint with the largest version `<= target`.
    pub fn checkpoint_at_or_before(&self, target: Version) -> Option<&CheckpointFiles> {
        self.checkpoints
            .range(..=target)
            .next_back()
            .map(|(_, files)| files)
    }

    /// Ascending commit versions.
    pub fn commit_versions(&self) -> impl Iterator<Item = Version> + '_ {
        self.commits.iter().copied()
    }

    /// Ascending versions that have a complete checkpoint.
    pub fn checkpoint_versions(&self) -> impl Iterator<Item = Version> + '_ {
        self.checkpoints.keys().copied()
    }

    /// Whether every commit `0..=end` is listed.
    pub fn has_commits_through(&self, end: Version) -> bool {
        self.commits.range(..=end).count() as u64 == end + 1
    }

    /// Whether a commit file exists for `version`.
    pub fn has_commit(&self, version: Version) -> bool {
        self.commits.contains(&version)
    }
}

/// Reader for the log directory of one table.
#[derive(Debug, Clone)]
pub struct LogSegmentReader {
    location: TableLocation,
}

impl LogSegmentReader {
    /// Create a reader for the table at `location`.
    pub fn new(location: TableLocation) -> Self {
        Self { location }
    }

    /// Get the TableLocation of the reader.
    pub fn location(&self) -> &TableLocation {
        &self.location
    }

    fn log_file(&self, name: &str) -> String {
        format!("{}/{}", self.location.log_dir(), name)
    }

    /// List the log directory.
    ///
    /// - No log directory, or no commits or checkpoints in it:
    ///   [`LogError::LogNotFound`].
    /// - A versioned name that a writer could not have produced:
    ///   [`LogError::CorruptLog`].
    pub async fn list(&self) -> Result<LogListing, LogError> {
        let log_dir = self.location.log_dir();
        let names = match self.location.backend().list(&log_dir).await {
            Ok(names) => names,
            Err(e) if e.is_not_found() => {
                return LogNotFoundSnafu { log_path: log_dir }.fail();
            }
            Err(source) => return Err(LogError::Storage { source }),
        };

        let has_hint = names
            .iter()
            .any(|n| n == layout::LAST_CHECKPOINT_FILE_NAME);

        let mut parsed = Vec::with_capacity(names.len());
        for name in &names {
            if let Some(p) = ParsedLogPath::parse(&log_dir, name)? {
                parsed.push(p);
            }
        }
        parsed.sort_by(|a, b| (a.version, &a.file_name).cmp(&(b.version, &b.file_name)));

        let mut listing = LogListing::default();
        let mut pending: Vec<ParsedLogPath> = Vec::new();
        for p in parsed {
            match p.kind {
                LogFileKind::Commit => {
                    listing.commits.insert(p.version);
                }
                LogFileKind::SinglePartCheckpoint | LogFileKind::MultiPartCheckpoint { .. } => {
                    pending.push(p);
                }
                LogFileKind::Other => {
                    debug!(
                        "ignoring log file {} at version {}",
                        p.file_name, p.version
                    );
                }
            }
        }

        let mut by_version: BTreeMap<Version, Vec<ParsedLogPath>> = BTreeMap::new();
        for p in pending {
            by_version.entry(p.version).or_default().push(p);
        }
        for (version, parts) in by_version {
            match complete_checkpoint(parts) {
                Some(files) => {
                    let paths = files.iter().map(|f| self.log_file(&f.file_name)).collect();
                    listing
                        .checkpoints
                        .insert(version, CheckpointFiles { version, paths });
                }
                None => debug!("ignoring incomplete checkpoint at version {version}"),
            }
        }

        if listing.commits.is_empty() && listing.checkpoints.is_empty() {
            return LogNotFoundSnafu { log_path: log_dir }.fail();
        }

        if has_hint {
            if let Some(hint) = self.read_last_checkpoint_hint().await? {
                let latest = listing.checkpoints.keys().next_back().copied();
                if latest != Some(hint.version) {
                    info!(
                        "_last_checkpoint hint is out of date. _last_checkpoint version: {}. Using actual most recent: {:?}",
                        hint.version, latest
                    );
                }
            }
        }

        Ok(listing)
    }

    /// Read and decode the `_last_checkpoint` hint.
    ///
    /// A missing or malformed hint is `Ok(None)`; the directory listing is
    /// always authoritative.
    pub async fn read_last_checkpoint_hint(&self) -> Result<Option<LastCheckpointHint>, LogError> {
        let path = self.log_file(layout::LAST_CHECKPOINT_FILE_NAME);
        let bytes = match self.location.backend().read(&path).await {
            Ok(b) => b,
            Err(StorageError::NotFound { .. }) => return Ok(None),
            Err(source) => return Err(LogError::Storage { source }),
        };

        match serde_json::from_slice::<LastCheckpointHint>(&bytes) {
            Ok(hint) => Ok(Some(hint)),
            Err(e) => {
                warn!("ignoring malformed {path}: {e}");
                Ok(None)
            }
        }
    }

    /// Read the commit file for `version`.
    ///
    /// Blank lines are skipped; every other line must be a single action
    /// object, otherwise the whole entry is [`LogError::CorruptLog`].
    pub async fn read_entry(&self, version: Version) -> Result<LogEntry, LogError> {
        let path = self.log_file(&layout::commit_file_name(version));
        let bytes = self
            .location
            .backend()
            .read(&path)
            .await
            .context(StorageSnafu)?;

        let text = std::str::from_utf8(&bytes).map_err(|e| {
            CorruptLogSnafu {
                version,
                path: path.clone(),
                msg: format!("commit is not valid UTF-8: {e}"),
            }
            .build()
        })?;

        let mut actions = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_action_line(line) {
                Ok(Some(action)) => actions.push(action),
                Ok(None) => {}
                Err(msg) => {
                    return CorruptLogSnafu {
                        version,
                        path,
                        msg: format!("line {}: {msg}", idx + 1),
                    }
                    .fail();
                }
            }
        }

        Ok(LogEntry { version, actions })
    }

    /// Read the commits for versions `(after, end]` (or `[0, end]` when
    /// `after` is `None`), up to `concurrency` files at a time.
    ///
    /// Entries are returned in ascending version order regardless of the
    /// order reads complete in. Every version in the range must be listed;
    /// a hole is [`LogError::CorruptLog`] naming the missing version.
    pub async fn read_entries(
        &self,
        listing: &LogListing,
        after: Option<Version>,
        end: Version,
        concurrency: usize,
    ) -> Result<Vec<LogEntry>, LogError> {
        let start = match after {
            Some(v) => v + 1,
            None => 0,
        };
        if start > end {
            return Ok(Vec::new());
        }

        if let Some(missing) = (start..=end).find(|v| !listing.has_commit(*v)) {
            return CorruptLogSnafu {
                version: missing,
                path: self.log_file(&layout::commit_file_name(missing)),
                msg: "commit required for replay is missing from the log listing".to_string(),
            }
            .fail();
        }

        debug!("reading commits {start}..={end}");
        stream::iter(start..=end)
            .map(|v| self.read_entry(v))
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }
}

/// Pick the files of one complete checkpoint among all checkpoint files at a
/// single version. A single-part checkpoint wins; otherwise the complete
/// multi-part group with the fewest parts.
fn complete_checkpoint(mut parts: Vec<ParsedLogPath>) -> Option<Vec<ParsedLogPath>> {
    if let Some(idx) = parts
        .iter()
        .position(|p| p.kind == LogFileKind::SinglePartCheckpoint)
    {
        return Some(vec![parts.swap_remove(idx)]);
    }

    let mut groups: BTreeMap<u32, BTreeMap<u32, ParsedLogPath>> = BTreeMap::new();
    for p in parts {
        if let LogFileKind::MultiPartCheckpoint { part, num_parts } = p.kind {
            groups.entry(num_parts).or_default().insert(part, p);
        }
    }

    groups
        .into_iter()
        .find(|(num_parts, files)| files.len() == *num_parts as usize)
        .map(|(_, files)| files.into_values().collect())
}
