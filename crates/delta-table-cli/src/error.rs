use delta_table_core::TableError;

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display(
        "Failed to open table at {table}. \
         Ensure the path contains a _delta_log directory with at least one commit."
    ))]
    OpenTable {
        table: String,
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display("Failed to resolve version {version} of {table}"))]
    LoadVersion {
        table: String,
        version: i64,
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display("Scan of {table} failed"))]
    Scan {
        table: String,
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display("Invalid --where {expr:?}: {msg}"))]
    InvalidFilter { expr: String, msg: String },

    #[snafu(display("--output needs --format csv or --format jsonl"))]
    TableFormatToFile,

    #[snafu(display("CSV output does not support column {field} of type {data_type}"))]
    CsvUnsupportedType { field: String, data_type: String },

    #[snafu(display("Arrow error while rendering output: {source}"))]
    Arrow { source: arrow::error::ArrowError },

    #[snafu(display("Failed to write output to {path}"))]
    WriteOutput {
        path: String,
        source: std::io::Error,
    },
}
