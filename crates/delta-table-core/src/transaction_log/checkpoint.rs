//! Decoding of Parquet checkpoints into the action model.
//!
//! A checkpoint at version `V` stores, one action per row, every live `add`
//! plus the effective `metaData` and `protocol` as of `V` (and `remove`
//! tombstones, which the reader drops). Each action kind is a top-level
//! struct column that is null on rows holding another kind.
//!
//! Rows are decoded by projecting the four action columns, rendering the
//! batch as line-delimited JSON with Arrow's JSON writer and feeding each
//! row through the same serde model used for commit files. Commit files and
//! checkpoints therefore cannot disagree on how an action is interpreted.
use arrow::json::LineDelimitedWriter;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use log::debug;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ProjectionMask};
use serde_json::{Map, Value};
use snafu::prelude::*;

use crate::storage::TableLocation;
use crate::transaction_log::{
    actions::{parse_action_value, Action, Add, Metadata, Protocol},
    log_segment::{CheckpointFiles, LogListing},
    CheckpointDecodeSnafu, LogError, StorageSnafu, Version,
};

/// Top-level checkpoint columns the reader needs.
const ACTION_COLUMNS: &[&str] = &["add", "remove", "metaData", "protocol"];

/// Table state materialised from a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointState {
    /// Version the checkpoint materialises.
    pub version: Version,
    /// Effective metadata at that version.
    pub metadata: Metadata,
    /// Effective protocol at that version.
    pub protocol: Protocol,
    /// Live files, in checkpoint row order.
    pub adds: Vec<Add>,
}

/// Loads checkpoints for one table.
#[derive(Debug, Clone)]
pub struct CheckpointMaterializer {
    location: TableLocation,
}

impl CheckpointMaterializer {
    /// Create a materializer for the table at `location`.
    pub fn new(location: TableLocation) -> Self {
        Self { location }
    }

    /// The checkpoint to start from when resolving `target`: the one with
    /// the largest version `<= target`, or `None` to replay from version 0.
    pub fn select(listing: &LogListing, target: Version) -> Option<&CheckpointFiles> {
        listing.checkpoint_at_or_before(target)
    }

    /// Read and decode every part of a checkpoint.
    pub async fn materialize(&self, files: &CheckpointFiles) -> Result<CheckpointState, LogError> {
        let version = files.version;
        debug!(
            "loading checkpoint {version} ({} part(s))",
            files.paths.len()
        );

        let parts: Vec<Vec<Action>> = stream::iter(files.paths.clone())
            .map(|path| async move {
                let bytes = self
                    .location
                    .backend()
                    .read(&path)
                    .await
                    .context(StorageSnafu)?;
                decode_checkpoint_part(version, &path, bytes)
            })
            .buffered(files.paths.len().max(1))
            .try_collect()
            .await?;

        let mut metadata = None;
        let mut protocol = None;
        let mut adds = Vec::new();
        for action in parts.into_iter().flatten() {
            match action {
                Action::Add(add) => adds.push(add),
                Action::Remove(_) => {}
                Action::MetaData(m) => metadata = Some(m),
                Action::Protocol(p) => protocol = Some(p),
            }
        }

        let first_path = files.paths.first().cloned().unwrap_or_default();
        let metadata = metadata.context(CheckpointDecodeSnafu {
            version,
            path: first_path.clone(),
            msg: "checkpoint has no metaData action",
        })?;
        let protocol = protocol.context(CheckpointDecodeSnafu {
            version,
            path: first_path,
            msg: "checkpoint has no protocol action",
        })?;

        Ok(CheckpointState {
            version,
            metadata,
            protocol,
            adds,
        })
    }
}

fn decode_checkpoint_part(
    version: Version,
    path: &str,
    bytes: Bytes,
) -> Result<Vec<Action>, LogError> {
    let decode_err = |msg: String| {
        CheckpointDecodeSnafu {
            version,
            path,
            msg,
        }
        .build()
    };

    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .map_err(|e| decode_err(format!("not a readable Parquet file: {e}")))?;

    let roots: Vec<usize> = builder
        .parquet_schema()
        .root_schema()
        .get_fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| ACTION_COLUMNS.contains(&f.name()))
        .map(|(i, _)| i)
        .collect();
    if roots.is_empty() {
        return Err(decode_err(
            "checkpoint has none of the add/remove/metaData/protocol columns".to_string(),
        ));
    }

    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    let reader = builder
        .with_projection(mask)
        .build()
        .map_err(|e| decode_err(format!("failed to build reader: {e}")))?;

    let mut json = Vec::new();
    {
        let mut writer = LineDelimitedWriter::new(&mut json);
        for batch in reader {
            let batch = batch.map_err(|e| decode_err(format!("failed to read batch: {e}")))?;
            writer
                .write(&batch)
                .map_err(|e| decode_err(format!("failed to render rows: {e}")))?;
        }
        writer
            .finish()
            .map_err(|e| decode_err(format!("failed to render rows: {e}")))?;
    }

    let mut actions = Vec::new();
    for (row, line) in json.split(|b| *b == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        let obj: Map<String, Value> = serde_json::from_slice(line)
            .map_err(|e| decode_err(format!("row {row}: {e}")))?;
        if let Some(action) =
            parse_action_value(obj).map_err(|msg| decode_err(format!("row {row}: {msg}")))?
        {
            actions.push(action);
        }
    }
    Ok(actions)
}
