//! Table layer.
//!
//! [`DeltaTable`] is the user-facing handle: it resolves versions into
//! [`Snapshot`]s, keeps the current one, and runs scans against any
//! snapshot.
//!
//! State is copy-on-write. A snapshot is never modified after it is built;
//! `update`/`load_version` build a new one and swap the `Arc` under a short
//! lock that is never held across an `.await`. Readers that already hold a
//! snapshot keep seeing exactly that version.
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};
use snafu::prelude::*;

use crate::expression::Predicate;
use crate::scan::{self, ParquetScanEngine, Projection, PushdownPlanner, ScanEngine, ScanResult};
use crate::schema::StructType;
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::storage::TableLocation;
use crate::transaction_log::{LogListing, Version};

pub mod config;
pub mod error;

pub use config::TableConfig;
pub use error::TableError;

use error::{LogSnafu, StorageSnafu, VersionNotFoundSnafu};

#[derive(Debug)]
struct TableState {
    listing: Arc<LogListing>,
    current: Arc<Snapshot>,
    /// Most recently resolved snapshot, a replay base candidate next to
    /// `current`.
    last_resolved: Arc<Snapshot>,
}

/// A versioned table opened for reading.
#[derive(Debug)]
pub struct DeltaTable {
    location: TableLocation,
    builder: SnapshotBuilder,
    engine: Arc<dyn ScanEngine>,
    config: TableConfig,
    state: RwLock<TableState>,
}

impl DeltaTable {
    /// Open the table at `path` (a local path or `file://` URI) at its latest
    /// version.
    pub async fn open(path: &str) -> Result<Self, TableError> {
        Self::open_with_config(path, TableConfig::default()).await
    }

    /// Open the table at `path` with `config`.
    pub async fn open_with_config(path: &str, config: TableConfig) -> Result<Self, TableError> {
        let location = TableLocation::parse(path).context(StorageSnafu)?;
        Self::open_location(location, config).await
    }

    /// Open the table at `location` with `config`.
    pub async fn open_location(
        location: TableLocation,
        config: TableConfig,
    ) -> Result<Self, TableError> {
        let builder = SnapshotBuilder::new(location.clone(), config.log_read_concurrency);
        let listing = builder.log().list().await.context(LogSnafu)?;
        let latest = listing.latest_version().unwrap_or_default();
        let snapshot = Arc::new(builder.build(&listing, latest, None).await?);
        info!(
            "opened table {location} at version {} ({} live file(s))",
            snapshot.version(),
            snapshot.files().len()
        );

        Ok(DeltaTable {
            location,
            builder,
            engine: Arc::new(ParquetScanEngine::new()),
            config,
            state: RwLock::new(TableState {
                listing: Arc::new(listing),
                current: snapshot.clone(),
                last_resolved: snapshot,
            }),
        })
    }

    /// Replace the engine used to read data files.
    pub fn with_scan_engine(mut self, engine: Arc<dyn ScanEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Table root.
    pub fn path(&self) -> &str {
        self.location.root()
    }

    /// Location the table was opened at.
    pub fn location(&self) -> &TableLocation {
        &self.location
    }

    /// `<root>/_delta_log`
    pub fn log_path(&self) -> String {
        self.location.log_dir()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    fn with_state<T>(&self, f: impl FnOnce(&TableState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.with_state(|s| s.current.clone())
    }

    /// Version of the current snapshot.
    pub fn version(&self) -> Version {
        self.with_state(|s| s.current.version())
    }

    /// Latest complete checkpoint version in the last listing.
    pub fn checkpoint(&self) -> Option<Version> {
        self.with_state(|s| s.listing.checkpoint_versions().last())
    }

    /// Commit versions in the last listing, ascending.
    pub fn commit_versions(&self) -> Vec<Version> {
        self.with_state(|s| s.listing.commit_versions().collect())
    }

    /// Complete checkpoint versions in the last listing, ascending.
    pub fn checkpoint_versions(&self) -> Vec<Version> {
        self.with_state(|s| s.listing.checkpoint_versions().collect())
    }

    /// Effective schema of the current snapshot.
    pub fn schema(&self) -> StructType {
        self.snapshot().schema().clone()
    }

    /// Partition columns of the current snapshot.
    pub fn partition_columns(&self) -> Vec<String> {
        self.snapshot().partition_columns().to_vec()
    }

    /// Live file paths of the current snapshot, as recorded in the log.
    pub fn files(&self) -> Vec<String> {
        self.snapshot()
            .file_paths()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Pick up commits written since the last listing and move the current
    /// snapshot to the new latest version. Returns that version.
    pub async fn update(&self) -> Result<Version, TableError> {
        let listing = Arc::new(self.builder.log().list().await.context(LogSnafu)?);
        let latest = listing.latest_version().unwrap_or_default();
        let current = self.snapshot();

        let snapshot = if current.version() == latest {
            debug!("update: already at latest version {latest}");
            current
        } else {
            self.resolve(&listing, latest).await?
        };

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.listing = listing;
        state.current = snapshot;
        info!("table {} updated to version {latest}", self.location);
        Ok(latest)
    }

    /// Move the current snapshot to `version`.
    pub async fn load_version(&self, version: i64) -> Result<Arc<Snapshot>, TableError> {
        let snapshot = self.snapshot_at(version).await?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.current = snapshot.clone();
        Ok(snapshot)
    }

    /// Resolve `version` without moving the current snapshot.
    ///
    /// Fails with `VersionNotFound` for a negative version, a version newer
    /// than the latest commit, or one older than the oldest reconstructable
    /// version.
    pub async fn snapshot_at(&self, version: i64) -> Result<Arc<Snapshot>, TableError> {
        let mut listing = self.with_state(|s| s.listing.clone());

        let Ok(target) = Version::try_from(version) else {
            return VersionNotFoundSnafu {
                requested: version,
                earliest: listing.earliest_reconstructable_version().unwrap_or_default(),
                latest: listing.latest_version().unwrap_or_default(),
            }
            .fail();
        };

        if listing.latest_version().is_some_and(|latest| target > latest) {
            // The version may have been committed since the last listing.
            listing = Arc::new(self.builder.log().list().await.context(LogSnafu)?);
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.listing = listing.clone();
        }

        if let Some(hit) = self.with_state(|s| {
            [&s.current, &s.last_resolved]
                .into_iter()
                .find(|snap| snap.version() == target)
                .cloned()
        }) {
            return Ok(hit);
        }

        self.resolve(&listing, target).await
    }

    async fn resolve(&self, listing: &LogListing, target: Version) -> Result<Arc<Snapshot>, TableError> {
        let base = if self.config.reuse_cached_snapshots {
            self.with_state(|s| {
                [&s.current, &s.last_resolved]
                    .into_iter()
                    .filter(|snap| snap.version() <= target)
                    .max_by_key(|snap| snap.version())
                    .cloned()
            })
        } else {
            None
        };

        let snapshot = Arc::new(self.builder.build(listing, target, base.as_ref()).await?);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.last_resolved = snapshot.clone();
        Ok(snapshot)
    }

    /// Scan `snapshot`, returning `projection` for the rows matching `filter`.
    ///
    /// The projection and filter are validated before any data file is
    /// opened.
    pub async fn scan(
        &self,
        snapshot: &Snapshot,
        projection: Projection,
        filter: Option<Predicate>,
    ) -> Result<ScanResult, TableError> {
        let plan = PushdownPlanner::new(snapshot).plan(&projection, filter.as_ref())?;
        let tasks = scan::file_tasks(snapshot, &plan, self.config.data_skipping)?;
        let output_schema = scan::output_schema(snapshot, &plan)?;
        scan::execute(
            &self.location,
            self.engine.as_ref(),
            &tasks,
            output_schema,
            self.config.scan_concurrency,
        )
        .await
    }

    /// Scan the current snapshot.
    pub async fn to_table(
        &self,
        projection: Projection,
        filter: Option<Predicate>,
    ) -> Result<ScanResult, TableError> {
        let snapshot = self.snapshot();
        self.scan(&snapshot, projection, filter).await
    }
}
