//! Reader configuration.

/// Tuning knobs for a [`DeltaTable`](crate::DeltaTable).
///
/// None of these change results, only how much work is done concurrently or
/// skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Commit files read concurrently during replay. Actions are still
    /// applied strictly in commit order.
    pub log_read_concurrency: usize,
    /// Data files read concurrently during a scan. Batches are still returned
    /// in live-file order.
    pub scan_concurrency: usize,
    /// Whether an already resolved snapshot may serve as the replay base
    /// for a later version.
    pub reuse_cached_snapshots: bool,
    /// Whether files whose statistics rule out the residual filter are
    /// skipped without being read.
    pub data_skipping: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            log_read_concurrency: 8,
            scan_concurrency: 4,
            reuse_cached_snapshots: true,
            data_skipping: true,
        }
    }
}

impl TableConfig {
    /// Set [`TableConfig::log_read_concurrency`] (at least 1).
    pub fn with_log_read_concurrency(mut self, n: usize) -> Self {
        self.log_read_concurrency = n.max(1);
        self
    }

    /// Set [`TableConfig::scan_concurrency`] (at least 1).
    pub fn with_scan_concurrency(mut self, n: usize) -> Self {
        self.scan_concurrency = n.max(1);
        self
    }

    /// Set [`TableConfig::reuse_cached_snapshots`].
    pub fn with_reuse_cached_snapshots(mut self, enabled: bool) -> Self {
        self.reuse_cached_snapshots = enabled;
        self
    }

    /// Set [`TableConfig::data_skipping`].
    pub fn with_data_skipping(mut self, enabled: bool) -> Self {
        self.data_skipping = enabled;
        self
    }
}
