//! Fixtures for unit tests: commit lines, checkpoints and Parquet data files.
use std::{error::Error, io::Cursor, sync::Arc};

use arrow::array::RecordBatch;
use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::json::ReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde_json::{json, Value};

use crate::storage::{layout, InMemoryStorage, TableLocation};
use crate::transaction_log::Version;

pub(crate) type TestResult = Result<(), Box<dyn Error>>;

/// An empty in-memory store and a table location rooted at `root` on it.
pub(crate) fn memory_table(root: &str) -> (Arc<InMemoryStorage>, TableLocation) {
    let store = Arc::new(InMemoryStorage::new());
    let location = TableLocation::new(root, store.clone());
    (store, location)
}

/// Schema JSON for a flat struct of `(name, type, nullable)` fields.
pub(crate) fn schema_string(fields: &[(&str, &str, bool)]) -> String {
    let fields: Vec<Value> = fields
        .iter()
        .map(|(name, ty, nullable)| {
            json!({"name": name, "type": ty, "nullable": nullable, "metadata": {}})
        })
        .collect();
    json!({"type": "struct", "fields": fields}).to_string()
}

pub(crate) fn protocol_line(reader: i32, writer: i32) -> String {
    json!({"protocol": {"minReaderVersion": reader, "minWriterVersion": writer}}).to_string()
}

pub(crate) fn protocol_line_with_features(reader_features: &[&str]) -> String {
    json!({"protocol": {
        "minReaderVersion": 3,
        "minWriterVersion": 7,
        "readerFeatures": reader_features,
        "writerFeatures": reader_features,
    }})
    .to_string()
}

pub(crate) fn metadata_line(schema: &str, partition_columns: &[&str]) -> String {
    metadata_line_with_config(schema, partition_columns, &[])
}

pub(crate) fn metadata_line_with_config(
    schema: &str,
    partition_columns: &[&str],
    config: &[(&str, &str)],
) -> String {
    let configuration: serde_json::Map<String, Value> = config
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect();
    json!({"metaData": {
        "id": "test-table",
        "format": {"provider": "parquet", "options": {}},
        "schemaString": schema,
        "partitionColumns": partition_columns,
        "configuration": configuration,
        "createdTime": 0,
    }})
    .to_string()
}

pub(crate) fn add_line(
    path: &str,
    partition_values: &[(&str, Option<&str>)],
    stats: Option<&str>,
) -> String {
    let pv: serde_json::Map<String, Value> = partition_values
        .iter()
        .map(|(k, v)| (k.to_string(), v.map(Value::from).unwrap_or(Value::Null)))
        .collect();
    let mut add = json!({
        "path": path,
        "partitionValues": pv,
        "size": 100,
        "modificationTime": 0,
        "dataChange": true,
    });
    if let (Some(stats), Some(obj)) = (stats, add.as_object_mut()) {
        obj.insert("stats".to_string(), Value::from(stats));
    }
    json!({ "add": add }).to_string()
}

pub(crate) fn remove_line(path: &str) -> String {
    json!({"remove": {"path": path, "deletionTimestamp": 1, "dataChange": true}}).to_string()
}

pub(crate) fn txn_line(app_id: &str, version: i64) -> String {
    json!({"txn": {"appId": app_id, "version": version, "lastUpdated": 0}}).to_string()
}

pub(crate) fn commit_info_line() -> String {
    json!({"commitInfo": {"timestamp": 0, "operation": "WRITE"}}).to_string()
}

/// Write `lines` as the commit file for `version`.
pub(crate) fn put_commit(store: &InMemoryStorage, root: &str, version: Version, lines: &[String]) {
    store.put(
        format!("{root}/{}/{}", layout::LOG_DIR_NAME, layout::commit_file_name(version)),
        lines.join("\n"),
    );
}

/// Write `lines` as a single-part checkpoint for `version`.
pub(crate) fn put_checkpoint(
    store: &InMemoryStorage,
    root: &str,
    version: Version,
    lines: &[String],
) -> TestResult {
    store.put(
        format!(
            "{root}/{}/{}",
            layout::LOG_DIR_NAME,
            layout::checkpoint_file_name(version)
        ),
        checkpoint_parquet_bytes(lines)?,
    );
    Ok(())
}

fn string_map() -> DataType {
    let entries = Fields::from(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, true),
    ]);
    DataType::Map(
        Arc::new(Field::new("key_value", DataType::Struct(entries), false)),
        false,
    )
}

fn string_list() -> DataType {
    DataType::List(Arc::new(Field::new("element", DataType::Utf8, true)))
}

fn struct_field(name: &str, fields: Vec<Field>) -> Field {
    Field::new(name, DataType::Struct(Fields::from(fields)), true)
}

/// The column layout writers use for checkpoint files (the subset the
/// reader consumes, plus `txn` so that skipped kinds are exercised).
pub(crate) fn checkpoint_schema() -> Schema {
    Schema::new(vec![
        struct_field(
            "txn",
            vec![
                Field::new("appId", DataType::Utf8, true),
                Field::new("version", DataType::Int64, true),
                Field::new("lastUpdated", DataType::Int64, true),
            ],
        ),
        struct_field(
            "add",
            vec![
                Field::new("path", DataType::Utf8, true),
                Field::new("partitionValues", string_map(), true),
                Field::new("size", DataType::Int64, true),
                Field::new("modificationTime", DataType::Int64, true),
                Field::new("dataChange", DataType::Boolean, true),
                Field::new("stats", DataType::Utf8, true),
            ],
        ),
        struct_field(
            "remove",
            vec![
                Field::new("path", DataType::Utf8, true),
                Field::new("deletionTimestamp", DataType::Int64, true),
                Field::new("dataChange", DataType::Boolean, true),
            ],
        ),
        struct_field(
            "metaData",
            vec![
                Field::new("id", DataType::Utf8, true),
                Field::new("name", DataType::Utf8, true),
                Field::new("description", DataType::Utf8, true),
                struct_field(
                    "format",
                    vec![
                        Field::new("provider", DataType::Utf8, true),
                        Field::new("options", string_map(), true),
                    ],
                ),
                Field::new("schemaString", DataType::Utf8, true),
                Field::new("partitionColumns", string_list(), true),
                Field::new("configuration", string_map(), true),
                Field::new("createdTime", DataType::Int64, true),
            ],
        ),
        struct_field(
            "protocol",
            vec![
                Field::new("minReaderVersion", DataType::Int32, true),
                Field::new("minWriterVersion", DataType::Int32, true),
                Field::new("readerFeatures", string_list(), true),
                Field::new("writerFeatures", string_list(), true),
            ],
        ),
    ])
}

/// Encode action lines as a checkpoint Parquet file.
pub(crate) fn checkpoint_parquet_bytes(lines: &[String]) -> Result<Vec<u8>, Box<dyn Error>> {
    let schema = Arc::new(checkpoint_schema());
    let reader = ReaderBuilder::new(schema.clone()).build(Cursor::new(lines.join("\n")))?;

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, None)?;
    for batch in reader {
        writer.write(&batch?)?;
    }
    writer.close()?;
    Ok(buf)
}

/// Encode a record batch as a Parquet file.
pub(crate) fn parquet_bytes(batch: &RecordBatch) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(buf)
}
