//! On-disk table fixtures shared by the integration tests.
//!
//! [`TableFixture`] writes tables the way an appending writer does: one
//! commit per append, each adding one Parquet file per `number2` partition,
//! with `numRecords`/`minValues`/`maxValues`/`nullCount` statistics.
#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::array::{ArrayRef, Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::json::ReaderBuilder;
use delta_table_core::{DeltaTable, ScanResult, TableConfig};
use parquet::arrow::ArrowWriter;
use serde_json::{json, Value};
use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Rows per append; half go to `number2 = 0`, half to `number2 = 1`.
pub const ROWS_PER_APPEND: i64 = 1_000;

/// Deterministic value in `[0, 1)` for row `id` and column salt `salt`.
pub fn pseudo_random(id: i64, salt: u64) -> f64 {
    let mut x = (id as u64).wrapping_add(salt.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    x ^= x >> 33;
    x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    x ^= x >> 33;
    (x % 1_000_000) as f64 / 1_000_000.0
}

fn salt_of(column: &str) -> u64 {
    column.bytes().map(u64::from).sum()
}

pub struct TableFixture {
    dir: TempDir,
    next_version: u64,
    columns: Vec<String>,
    protocol: Value,
    metadata: Option<Value>,
    live: BTreeMap<String, Value>,
    order: Vec<String>,
}

impl TableFixture {
    pub fn new() -> TestResult<Self> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("_delta_log"))?;
        Ok(TableFixture {
            dir,
            next_version: 0,
            columns: vec!["id".into(), "number".into()],
            protocol: json!({"minReaderVersion": 1, "minWriterVersion": 2}),
            metadata: None,
            live: BTreeMap::new(),
            order: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn root_str(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("_delta_log")
    }

    pub fn commit_path(&self, version: u64) -> PathBuf {
        self.log_dir().join(format!("{version:020}.json"))
    }

    /// Latest written version.
    pub fn version(&self) -> u64 {
        self.next_version.saturating_sub(1)
    }

    fn schema_string(&self) -> String {
        let mut fields = vec![json!({"name": "id", "type": "long", "nullable": true, "metadata": {}})];
        for c in self.columns.iter().skip(1) {
            fields.push(json!({"name": c, "type": "double", "nullable": true, "metadata": {}}));
            if c == "number" {
                fields.push(
                    json!({"name": "number2", "type": "integer", "nullable": true, "metadata": {}}),
                );
            }
        }
        json!({"type": "struct", "fields": fields}).to_string()
    }

    fn metadata_action(&self) -> Value {
        json!({"metaData": {
            "id": "fixture",
            "format": {"provider": "parquet", "options": {}},
            "schemaString": self.schema_string(),
            "partitionColumns": ["number2"],
            "configuration": {},
            "createdTime": 0,
        }})
    }

    /// Write `actions` as the next commit.
    pub fn commit(&mut self, actions: Vec<Value>) -> TestResult<u64> {
        let version = self.next_version;
        let mut lines = Vec::with_capacity(actions.len() + 1);
        lines.push(json!({"commitInfo": {"timestamp": version, "operation": "WRITE"}}).to_string());
        for action in actions {
            if let Some(add) = action.get("add") {
                let path = add["path"].as_str().unwrap_or_default().to_string();
                if self.live.insert(path.clone(), add.clone()).is_none() {
                    self.order.push(path);
                }
            } else if let Some(remove) = action.get("remove") {
                let path = remove["path"].as_str().unwrap_or_default();
                self.live.remove(path);
                self.order.retain(|p| p != path);
            } else if let Some(meta) = action.get("metaData") {
                self.metadata = Some(meta.clone());
            } else if let Some(protocol) = action.get("protocol") {
                self.protocol = protocol.clone();
            }
            lines.push(action.to_string());
        }
        fs::write(self.commit_path(version), lines.join("\n"))?;
        self.next_version += 1;
        Ok(version)
    }

    /// Write a data file at `rel` and return its `add` action.
    pub fn write_data_file(
        &self,
        rel: &str,
        partition: i64,
        batch: &RecordBatch,
    ) -> TestResult<Value> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None)?;
        writer.write(batch)?;
        writer.close()?;
        let size = buf.len();
        fs::write(&path, buf)?;

        Ok(json!({"add": {
            "path": rel,
            "partitionValues": {"number2": partition.to_string()},
            "size": size,
            "modificationTime": 0,
            "dataChange": true,
            "stats": stats_json(batch),
        }}))
    }

    /// Append `ROWS_PER_APPEND` rows with ids starting at
    /// `index * ROWS_PER_APPEND`, adding `new_columns` (doubles) to the
    /// schema first.
    pub fn append(&mut self, index: i64, new_columns: &[&str]) -> TestResult<u64> {
        let mut actions = Vec::new();
        if self.next_version == 0 {
            actions.push(json!({"protocol": self.protocol.clone()}));
        }
        let schema_changed = !new_columns.is_empty();
        self.columns.extend(new_columns.iter().map(|c| c.to_string()));
        if self.next_version == 0 || schema_changed {
            actions.push(self.metadata_action());
        }

        let version = self.next_version;
        for partition in 0..2i64 {
            let half = ROWS_PER_APPEND / 2;
            let ids: Vec<i64> = (0..half)
                .map(|i| index * ROWS_PER_APPEND + partition * half + i)
                .collect();
            let batch = self.rows(&ids, &BTreeMap::new())?;
            let rel = format!("number2={partition}/part-{version:05}-{partition}.parquet");
            actions.push(self.write_data_file(&rel, partition, &batch)?);
        }
        self.commit(actions)
    }

    /// A batch of the current data columns for `ids`; `overrides` replaces
    /// the `number` value of individual ids.
    pub fn rows(&self, ids: &[i64], overrides: &BTreeMap<i64, f64>) -> TestResult<RecordBatch> {
        let mut fields = Vec::new();
        let mut arrays: Vec<ArrayRef> = Vec::new();
        for c in &self.columns {
            if c == "id" {
                fields.push(Field::new("id", DataType::Int64, true));
                arrays.push(Arc::new(Int64Array::from(ids.to_vec())));
            } else {
                fields.push(Field::new(c, DataType::Float64, true));
                let values: Vec<f64> = ids
                    .iter()
                    .map(|id| match overrides.get(id) {
                        Some(v) if c == "number" => *v,
                        _ => pseudo_random(*id, salt_of(c)),
                    })
                    .collect();
                arrays.push(Arc::new(Float64Array::from(values)));
            }
        }
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }

    /// Live `add` actions in commit order.
    pub fn live_adds(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|p| self.live.get(p))
            .map(|add| json!({ "add": add }))
            .collect()
    }

    /// Write a single-part checkpoint of the current state, plus the
    /// `_last_checkpoint` hint.
    pub fn checkpoint(&self) -> TestResult {
        let version = self.version();
        let mut lines = vec![json!({"protocol": self.protocol.clone()}).to_string()];
        if let Some(meta) = &self.metadata {
            lines.push(json!({ "metaData": meta }).to_string());
        }
        lines.extend(self.live_adds().iter().map(Value::to_string));

        let schema = Arc::new(checkpoint_schema());
        let reader = ReaderBuilder::new(schema.clone()).build(Cursor::new(lines.join("\n")))?;
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, schema, None)?;
        for batch in reader {
            writer.write(&batch?)?;
        }
        writer.close()?;

        fs::write(
            self.log_dir().join(format!("{version:020}.checkpoint.parquet")),
            buf,
        )?;
        fs::write(
            self.log_dir().join("_last_checkpoint"),
            json!({"version": version, "size": lines.len()}).to_string(),
        )?;
        Ok(())
    }

    pub async fn open(&self) -> TestResult<DeltaTable> {
        Ok(DeltaTable::open(&self.root_str()).await?)
    }

    pub async fn open_with(&self, config: TableConfig) -> TestResult<DeltaTable> {
        Ok(DeltaTable::open_with_config(&self.root_str(), config).await?)
    }
}

fn stats_json(batch: &RecordBatch) -> String {
    let mut min = serde_json::Map::new();
    let mut max = serde_json::Map::new();
    let mut nulls = serde_json::Map::new();
    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        let name = field.name().clone();
        if let Some(a) = column.as_any().downcast_ref::<Int64Array>() {
            min.insert(name.clone(), json!(a.values().iter().min()));
            max.insert(name.clone(), json!(a.values().iter().max()));
        } else if let Some(a) = column.as_any().downcast_ref::<Float64Array>() {
            let lo = a.values().iter().copied().fold(f64::INFINITY, f64::min);
            let hi = a.values().iter().copied().fold(f64::NEG_INFINITY, f64::max);
            min.insert(name.clone(), json!(lo));
            max.insert(name.clone(), json!(hi));
        }
        nulls.insert(name, json!(column.null_count()));
    }
    json!({
        "numRecords": batch.num_rows(),
        "minValues": min,
        "maxValues": max,
        "nullCount": nulls,
    })
    .to_string()
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

fn checkpoint_schema() -> Schema {
    Schema::new(vec![
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

/// The 12-append table: versions 0..=11, checkpoint at 10.
pub fn append_table() -> TestResult<TableFixture> {
    let mut fixture = TableFixture::new()?;
    for i in 0..12 {
        fixture.append(i, &[])?;
        if fixture.version() == 10 {
            fixture.checkpoint()?;
        }
    }
    Ok(fixture)
}

/// All `id` values of a scan result, sorted.
pub fn sorted_ids(result: &ScanResult) -> Vec<i64> {
    let mut ids: Vec<i64> = result
        .batches()
        .iter()
        .flat_map(|b| {
            let idx = b.schema().index_of("id").expect("id column");
            b.column(idx)
                .as_any()
                .downcast_ref::<Int64Array>()
                .expect("id is Int64")
                .values()
                .to_vec()
        })
        .collect();
    ids.sort_unstable();
    ids
}

/// All values of a `Float64` column, in result order.
pub fn doubles(result: &ScanResult, column: &str) -> Vec<Option<f64>> {
    result
        .batches()
        .iter()
        .flat_map(|b| {
            let idx = b.schema().index_of(column).expect("column");
            b.column(idx)
                .as_any()
                .downcast_ref::<Float64Array>()
                .expect("Float64")
                .iter()
                .collect::<Vec<_>>()
        })
        .collect()
}
