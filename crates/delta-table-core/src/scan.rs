//! Scanning a snapshot.
//!
//! A scan runs in three steps:
//! 1. [`PushdownPlanner`] validates the projection and filter against the
//!    snapshot schema and splits the filter (no I/O).
//! 2. [`file_tasks`] selects live files with the partition filter and, when
//!    enabled, drops files whose statistics rule out the residual filter.
//! 3. [`execute`] hands each file to a [`ScanEngine`], which reads it,
//!    materialises partition columns and applies the residual filter.
//!
//! Batches come back in live-file order regardless of how many files are
//! read concurrently.
use std::fmt::Debug;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{Schema, SchemaRef};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use log::debug;
use snafu::prelude::*;

use crate::expression::Predicate;
use crate::file_index::{stats, FileSetIndex};
use crate::snapshot::{LiveFile, Snapshot};
use crate::storage::TableLocation;
use crate::table::error::{TableError, UnknownColumnSnafu};

pub mod evaluate;
pub mod parquet;
pub mod planner;
pub mod result;

pub use self::parquet::ParquetScanEngine;
pub use planner::{Projection, PushdownPlanner, ScanPlan};
pub use result::ScanResult;

/// Work for one data file.
#[derive(Debug, Clone)]
pub struct FileScanTask {
    /// The live file to read.
    pub file: LiveFile,
    /// Columns to materialise, with their effective types, in schema order.
    pub read_schema: SchemaRef,
    /// Which of the read columns are partition columns.
    pub partition_columns: Vec<String>,
    /// Row filter, bound to the effective schema.
    pub residual: Option<Predicate>,
    /// Output columns, in output order.
    pub output_schema: SchemaRef,
}

/// Reads data files on behalf of a scan.
///
/// Implementations must return exactly the rows of the file that satisfy
/// `task.residual`, shaped as `task.output_schema`.
#[async_trait]
pub trait ScanEngine: Send + Sync + Debug {
    /// Read one file.
    async fn scan_file(
        &self,
        location: &TableLocation,
        task: &FileScanTask,
    ) -> Result<Vec<RecordBatch>, TableError>;
}

/// Output schema of `plan` over `snapshot`.
pub fn output_schema(snapshot: &Snapshot, plan: &ScanPlan) -> Result<SchemaRef, TableError> {
    project_schema(snapshot, &plan.output_columns)
}

fn project_schema(snapshot: &Snapshot, columns: &[String]) -> Result<SchemaRef, TableError> {
    let arrow_schema = snapshot.arrow_schema();
    let fields = columns
        .iter()
        .map(|c| {
            arrow_schema
                .field_with_name(c)
                .ok()
                .cloned()
                .context(UnknownColumnSnafu { column: c.as_str() })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

/// Per-file tasks for `plan`, in live-file order.
pub fn file_tasks(
    snapshot: &Snapshot,
    plan: &ScanPlan,
    data_skipping: bool,
) -> Result<Vec<FileScanTask>, TableError> {
    let index = FileSetIndex::new(snapshot)?;
    let candidates = index.files_matching(plan.partition_filter.as_ref())?;
    let pruned = index.len() - candidates.len();

    let read_schema = project_schema(snapshot, &plan.read_columns)?;
    let output_schema = output_schema(snapshot, plan)?;
    let partition_columns: Vec<String> = plan
        .read_columns
        .iter()
        .filter(|c| snapshot.is_partition_column(c))
        .cloned()
        .collect();

    let mut skipped = 0usize;
    let mut tasks = Vec::with_capacity(candidates.len());
    for file in candidates {
        if data_skipping {
            if let (Some(residual), Some(file_stats)) = (&plan.residual, file.add.parsed_stats()) {
                if !stats::may_match(residual, &file_stats, snapshot.schema()) {
                    skipped += 1;
                    continue;
                }
            }
        }
        tasks.push(FileScanTask {
            file: file.clone(),
            read_schema: read_schema.clone(),
            partition_columns: partition_columns.clone(),
            residual: plan.residual.clone(),
            output_schema: output_schema.clone(),
        });
    }

    debug!(
        "scan of version {}: {} file(s), {pruned} pruned by partition, {skipped} skipped by stats",
        snapshot.version(),
        tasks.len()
    );
    Ok(tasks)
}

/// Run `tasks` on `engine`, reading up to `concurrency` files at a time.
pub async fn execute(
    location: &TableLocation,
    engine: &dyn ScanEngine,
    tasks: &[FileScanTask],
    output_schema: SchemaRef,
    concurrency: usize,
) -> Result<ScanResult, TableError> {
    let per_file: Vec<Vec<RecordBatch>> = stream::iter(tasks)
        .map(|task| engine.scan_file(location, task))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(ScanResult::new(
        output_schema,
        per_file.into_iter().flatten().collect(),
    ))
}
