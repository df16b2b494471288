//! Materialised scan output.
use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use snafu::prelude::*;

use crate::table::error::{ArrowSnafu, TableError};

/// Batches returned by a table scan, in live-file order.
#[derive(Debug, Clone)]
pub struct ScanResult {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl ScanResult {
    pub(crate) fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    /// Output schema: the projected columns with their effective types.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Output column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }

    /// Total number of rows.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// The batches.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Consume into the batches.
    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    /// All rows as a single batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch, TableError> {
        concat_batches(&self.schema, &self.batches).context(ArrowSnafu)
    }
}
