#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use serde_json::json;
use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn write_parquet(path: &Path, ids: &[i64], values: &[f64]) -> TestResult<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, true),
        Field::new("value", DataType::Float64, true),
    ]);
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(Float64Array::from(values.to_vec())),
        ],
    )?;
    let file = fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(fs::metadata(path)?.len())
}

fn add(root: &Path, rel: &str, part: &str, ids: &[i64], values: &[f64]) -> TestResult<String> {
    let size = write_parquet(&root.join(rel), ids, values)?;
    let stats = json!({
        "numRecords": ids.len(),
        "minValues": {"id": ids.iter().min()},
        "maxValues": {"id": ids.iter().max()},
        "nullCount": {"id": 0, "value": 0},
    });
    Ok(json!({"add": {
        "path": rel,
        "partitionValues": {"part": part},
        "size": size,
        "modificationTime": 0,
        "dataChange": true,
        "stats": stats.to_string(),
    }})
    .to_string())
}

/// A table partitioned by `part` (a string):
/// - version 0: `part=a` with ids 1..=3
/// - version 1: `part=b` with ids 4..=6
/// - version 2: removes the `part=a` file and adds `part=a` with ids 7..=8
pub fn sample_table() -> TestResult<TempDir> {
    let dir = TempDir::new()?;
    let root = dir.path();
    let log = root.join("_delta_log");
    fs::create_dir_all(&log)?;

    let schema = json!({"type": "struct", "fields": [
        {"name": "id", "type": "long", "nullable": true, "metadata": {}},
        {"name": "value", "type": "double", "nullable": true, "metadata": {}},
        {"name": "part", "type": "string", "nullable": true, "metadata": {}},
    ]});
    let v0 = [
        json!({"protocol": {"minReaderVersion": 1, "minWriterVersion": 2}}).to_string(),
        json!({"metaData": {
            "id": "sample",
            "format": {"provider": "parquet", "options": {}},
            "schemaString": schema.to_string(),
            "partitionColumns": ["part"],
            "configuration": {},
            "createdTime": 0,
        }})
        .to_string(),
        add(root, "part=a/0.parquet", "a", &[1, 2, 3], &[0.5, 1.5, 2.5])?,
    ];
    fs::write(log.join(format!("{:020}.json", 0)), v0.join("\n"))?;

    let v1 = [add(root, "part=b/1.parquet", "b", &[4, 5, 6], &[3.5, 4.5, 5.5])?];
    fs::write(log.join(format!("{:020}.json", 1)), v1.join("\n"))?;

    let v2 = [
        json!({"remove": {"path": "part=a/0.parquet", "deletionTimestamp": 2, "dataChange": true}})
            .to_string(),
        add(root, "part=a/2.parquet", "a", &[7, 8], &[6.5, 7.5])?,
    ];
    fs::write(log.join(format!("{:020}.json", 2)), v2.join("\n"))?;

    Ok(dir)
}
