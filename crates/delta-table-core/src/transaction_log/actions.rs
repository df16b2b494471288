//! Log actions: the typed records stored one per line in commit files.
//!
//! Only the four kinds that change resolved table state are modelled:
//! [`Action::MetaData`], [`Action::Protocol`], [`Action::Add`] and
//! [`Action::Remove`]. Other kinds that writers emit (`commitInfo`, `txn`,
//! `cdc`, ...) are recognised and skipped by [`parse_action_value`].
use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An action recorded in a commit or checkpoint.
///
/// Serialised externally tagged, e.g. `{"add": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Replace the table metadata (schema, partition columns, configuration).
    #[serde(rename = "metaData")]
    MetaData(Metadata),
    /// Declare the reader/writer protocol the table requires.
    Protocol(Protocol),
    /// A data file became live.
    Add(Add),
    /// A data file stopped being live.
    Remove(Remove),
}

/// Table-level metadata carried by a `metaData` action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Unique table identifier.
    pub id: String,
    /// Optional user-facing table name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Data file format.
    #[serde(default)]
    pub format: Format,
    /// Table schema as a JSON-encoded struct type.
    pub schema_string: String,
    /// Ordered names of the partition columns.
    #[serde(default)]
    pub partition_columns: Vec<String>,
    /// Table properties (`delta.columnMapping.mode`, ...).
    #[serde(default)]
    pub configuration: HashMap<String, Option<String>>,
    /// Creation time in milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
}

impl Metadata {
    /// Look up a table property, treating an explicit JSON null as unset.
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).and_then(|v| v.as_deref())
    }
}

/// Data file format descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    /// Format name; always `parquet` for tables this crate reads.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Format options.
    #[serde(default)]
    pub options: HashMap<String, Option<String>>,
}

fn default_provider() -> String {
    "parquet".to_string()
}

impl Default for Format {
    fn default() -> Self {
        Format {
            provider: default_provider(),
            options: HashMap::new(),
        }
    }
}

/// Reader and writer protocol requirements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    /// Minimum reader protocol version.
    pub min_reader_version: i32,
    /// Minimum writer protocol version.
    pub min_writer_version: i32,
    /// Reader features (reader version 3 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reader_features: Option<Vec<String>>,
    /// Writer features (writer version 7 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_features: Option<Vec<String>>,
}

/// A data file becoming part of the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Add {
    /// URI-encoded path of the file relative to the table root.
    pub path: String,
    /// Partition column name to string-encoded value (null for the null
    /// partition).
    #[serde(default)]
    pub partition_values: HashMap<String, Option<String>>,
    /// File size in bytes.
    pub size: i64,
    /// Last modification time in milliseconds since the epoch.
    pub modification_time: i64,
    /// Whether the commit changed table data (false for compaction).
    #[serde(default)]
    pub data_change: bool,
    /// JSON-encoded column statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<String>,
    /// Free-form file tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, Option<String>>>,
}

impl Add {
    /// Parse the `stats` string, if any.
    ///
    /// Statistics only ever drive optional pruning, so malformed stats are
    /// logged and treated as absent.
    pub fn parsed_stats(&self) -> Option<FileStats> {
        let raw = self.stats.as_deref()?;
        match serde_json::from_str(raw) {
            Ok(stats) => Some(stats),
            Err(e) => {
                debug!("ignoring malformed stats for {}: {e}", self.path);
                None
            }
        }
    }

    /// Partition value for `column`, `None` for the null partition or a
    /// missing entry.
    pub fn partition_value(&self, column: &str) -> Option<&str> {
        self.partition_values.get(column).and_then(|v| v.as_deref())
    }
}

/// A data file leaving the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remove {
    /// URI-encoded path of the file relative to the table root.
    pub path: String,
    /// Deletion time in milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<i64>,
    /// Whether the commit changed table data.
    #[serde(default)]
    pub data_change: bool,
    /// Whether the optional fields below are populated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_file_metadata: Option<bool>,
    /// Partition values of the removed file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_values: Option<HashMap<String, Option<String>>>,
    /// Size of the removed file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// Per-file column statistics as written in `add.stats`.
///
/// Values stay as JSON and are interpreted against the column type by the
/// data skipping code.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    /// Number of rows in the file.
    #[serde(default)]
    pub num_records: Option<i64>,
    /// Column name to minimum value.
    #[serde(default)]
    pub min_values: Map<String, Value>,
    /// Column name to maximum value.
    #[serde(default)]
    pub max_values: Map<String, Value>,
    /// Column name to number of nulls.
    #[serde(default)]
    pub null_count: Map<String, Value>,
}

/// Action kinds that may appear in a log but carry nothing the reader needs.
const IGNORED_KINDS: &[&str] = &[
    "commitInfo",
    "txn",
    "cdc",
    "domainMetadata",
    "checkpointMetadata",
    "sidecar",
];

/// Decode one action object (`{"<kind>": {...}}`).
///
/// Returns `Ok(None)` for kinds the reader skips and for an empty object
/// (checkpoint rows for skipped kinds decode to `{}`). The error string
/// describes why the object is not a well-formed action.
pub(crate) fn parse_action_value(obj: Map<String, Value>) -> Result<Option<Action>, String> {
    if obj.is_empty() {
        return Ok(None);
    }
    if obj.len() != 1 {
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        return Err(format!("expected a single action per line, found keys {keys:?}"));
    }

    let kind = obj.keys().next().map(String::clone).unwrap_or_default();
    match kind.as_str() {
        "add" | "remove" | "metaData" | "protocol" => {
            serde_json::from_value::<Action>(Value::Object(obj))
                .map(Some)
                .map_err(|e| format!("malformed {kind} action: {e}"))
        }
        k if IGNORED_KINDS.contains(&k) => Ok(None),
        other => {
            debug!("skipping unknown action kind {other:?}");
            Ok(None)
        }
    }
}

/// Decode one line of a commit file.
pub(crate) fn parse_action_line(line: &str) -> Result<Option<Action>, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    match value {
        Value::Object(obj) if !obj.is_empty() => parse_action_value(obj),
        other => Err(format!("expected a non-empty JSON object, found {other}")),
    }
}
