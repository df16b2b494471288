//! Parquet implementation of [`ScanEngine`].
//!
//! Per file:
//! - read the whole object through the table's storage backend and build a
//!   `ParquetRecordBatchReader` over the in-memory bytes,
//! - project the top-level columns the task needs that exist in the file,
//! - rebuild every batch against the task's read schema: partition columns
//!   come from the file's partition values, columns the file lacks are
//!   all-null, narrower physical types are cast to the effective type,
//! - apply the residual filter and project to the output columns.
use arrow::array::{new_null_array, Array, ArrayRef, RecordBatch, RecordBatchOptions, StringArray};
use arrow::compute::filter_record_batch;
use arrow::compute::kernels::cast::{can_cast_types, cast_with_options, CastOptions};
use arrow::datatypes::{DataType as ArrowDataType, Schema};
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ProjectionMask};
use snafu::prelude::*;
use std::sync::Arc;

use crate::scan::{evaluate::evaluate_predicate, FileScanTask, ScanEngine};
use crate::storage::TableLocation;
use crate::table::error::{
    ArrowSnafu, IncompatibleFileColumnSnafu, InvalidPartitionValueSnafu, ParquetReadSnafu,
    StorageSnafu, TableError,
};

/// Reads Parquet data files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetScanEngine;

impl ParquetScanEngine {
    /// Create the engine.
    pub fn new() -> Self {
        ParquetScanEngine
    }
}

#[async_trait]
impl ScanEngine for ParquetScanEngine {
    async fn scan_file(
        &self,
        location: &TableLocation,
        task: &FileScanTask,
    ) -> Result<Vec<RecordBatch>, TableError> {
        let path = location.resolve_data_path(task.file.path());
        let bytes = location.backend().read(&path).await.context(StorageSnafu)?;
        read_file(&path, bytes, task)
    }
}

fn read_file(path: &str, bytes: Bytes, task: &FileScanTask) -> Result<Vec<RecordBatch>, TableError> {
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(bytes).context(ParquetReadSnafu { path })?;

    let wanted: Vec<&str> = task
        .read_schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .filter(|name| !task.partition_columns.iter().any(|p| p == name))
        .collect();
    let roots: Vec<usize> = builder
        .parquet_schema()
        .root_schema()
        .get_fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| wanted.contains(&f.name()))
        .map(|(i, _)| i)
        .collect();

    let mut out = Vec::new();
    if roots.is_empty() {
        // Only partition columns or columns the file lacks: the row count
        // comes from the footer, no column chunk is read.
        let num_rows = usize::try_from(builder.metadata().file_metadata().num_rows()).unwrap_or(0);
        debug!("{path}: no stored column needed, {num_rows} row(s) from footer");
        if num_rows > 0 {
            let empty = RecordBatch::try_new_with_options(
                Arc::new(Schema::empty()),
                vec![],
                &RecordBatchOptions::new().with_row_count(Some(num_rows)),
            )
            .context(ArrowSnafu)?;
            push_batch(path, &empty, task, &mut out)?;
        }
        return Ok(out);
    }

    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    let reader = builder
        .with_projection(mask)
        .build()
        .context(ParquetReadSnafu { path })?;

    for batch in reader {
        let batch = batch.context(ArrowSnafu)?;
        push_batch(path, &batch, task, &mut out)?;
    }
    Ok(out)
}

fn push_batch(
    path: &str,
    stored: &RecordBatch,
    task: &FileScanTask,
    out: &mut Vec<RecordBatch>,
) -> Result<(), TableError> {
    let num_rows = stored.num_rows();
    let columns = task
        .read_schema
        .fields()
        .iter()
        .map(|field| {
            let name = field.name();
            if task.partition_columns.iter().any(|p| p == name) {
                partition_column(path, task, name, field.data_type(), num_rows)
            } else {
                match stored.column_by_name(name) {
                    None => Ok(new_null_array(field.data_type(), num_rows)),
                    Some(array) => conform(path, name, array, field.data_type()),
                }
            }
        })
        .collect::<Result<Vec<ArrayRef>, TableError>>()?;

    let batch = RecordBatch::try_new_with_options(
        task.read_schema.clone(),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(num_rows)),
    )
    .context(ArrowSnafu)?;

    let batch = match &task.residual {
        None => batch,
        Some(residual) => {
            let mask = evaluate_predicate(&batch, residual)?;
            filter_record_batch(&batch, &mask).context(ArrowSnafu)?
        }
    };
    if batch.num_rows() == 0 {
        return Ok(());
    }

    let indices = task
        .output_schema
        .fields()
        .iter()
        .map(|f| task.read_schema.index_of(f.name()))
        .collect::<Result<Vec<_>, _>>()
        .context(ArrowSnafu)?;
    out.push(batch.project(&indices).context(ArrowSnafu)?);
    Ok(())
}

fn partition_column(
    path: &str,
    task: &FileScanTask,
    column: &str,
    data_type: &ArrowDataType,
    num_rows: usize,
) -> Result<ArrayRef, TableError> {
    let Some(value) = task.file.add.partition_value(column).filter(|v| !v.is_empty()) else {
        return Ok(new_null_array(data_type, num_rows));
    };
    let strings: ArrayRef = Arc::new(StringArray::from(vec![value; num_rows]));
    if data_type == &ArrowDataType::Utf8 {
        return Ok(strings);
    }
    cast_with_options(&strings, data_type, &strict())
        .ok()
        .context(InvalidPartitionValueSnafu {
            column,
            value,
            path,
        })
}

fn conform(
    path: &str,
    column: &str,
    array: &ArrayRef,
    data_type: &ArrowDataType,
) -> Result<ArrayRef, TableError> {
    if array.data_type() == data_type {
        return Ok(array.clone());
    }
    let incompatible = || {
        IncompatibleFileColumnSnafu {
            path,
            column,
            found: array.data_type().to_string(),
            expected: data_type.to_string(),
        }
        .build()
    };
    if !can_cast_types(array.data_type(), data_type) {
        return Err(incompatible());
    }
    cast_with_options(array, data_type, &strict()).map_err(|_| incompatible())
}

fn strict() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        ..Default::default()
    }
}
