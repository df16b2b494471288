use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use arrow::{
    array::RecordBatch,
    datatypes::{DataType, Schema},
    error::ArrowError,
    util::display::{ArrayFormatter, FormatOptions},
};
use snafu::ResultExt;
use tabled::{builder::Builder, settings::Style};

use crate::error::{ArrowSnafu, CliError, CliResult, CsvUnsupportedTypeSnafu, WriteOutputSnafu};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Csv,
    Jsonl,
}

#[derive(Debug, Clone)]
pub struct ScanOpts {
    pub timing: bool,
    pub max_rows: usize,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

pub fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return String::new();
    }

    let mut builder = Builder::default();
    builder.push_record(columns);
    for row in rows {
        builder.push_record(row);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

/// The first `max_rows` rows of `batches`, formatted as strings.
pub fn preview_rows(batches: &[RecordBatch], max_rows: usize) -> CliResult<Vec<Vec<String>>> {
    let options = FormatOptions::default().with_null("null");
    let mut rows = Vec::new();
    let mut left = max_rows;

    for batch in batches {
        if left == 0 {
            break;
        }
        let formatters = batch
            .columns()
            .iter()
            .map(|col| ArrayFormatter::try_new(col.as_ref(), &options))
            .collect::<Result<Vec<_>, ArrowError>>()
            .context(ArrowSnafu)?;

        let take = left.min(batch.num_rows());
        for row_idx in 0..take {
            let mut row = Vec::with_capacity(formatters.len());
            for formatter in &formatters {
                row.push(
                    formatter
                        .value(row_idx)
                        .try_to_string()
                        .context(ArrowSnafu)?,
                );
            }
            rows.push(row);
        }
        left -= take;
    }
    Ok(rows)
}

pub fn ensure_csv_supported(schema: &Schema) -> CliResult<()> {
    for field in schema.fields() {
        let dt = field.data_type();
        let unsupported = matches!(
            dt,
            DataType::List(_)
                | DataType::LargeList(_)
                | DataType::FixedSizeList(_, _)
                | DataType::Struct(_)
                | DataType::Map(_, _)
                | DataType::Union(_, _)
        );

        if unsupported {
            return CsvUnsupportedTypeSnafu {
                field: field.name().to_string(),
                data_type: format!("{dt:?}"),
            }
            .fail();
        }
    }

    Ok(())
}

/// Write every batch to `out` as CSV (with a header) or JSON lines.
pub fn write_batches<W: Write>(
    schema: &Schema,
    batches: &[RecordBatch],
    format: OutputFormat,
    out: W,
) -> CliResult<()> {
    match format {
        OutputFormat::Csv => {
            ensure_csv_supported(schema)?;
            let mut writer = arrow::csv::WriterBuilder::new()
                .with_header(true)
                .build(out);
            for batch in batches {
                writer.write(batch).context(ArrowSnafu)?;
            }
            Ok(())
        }
        OutputFormat::Jsonl => {
            let mut writer = arrow::json::LineDelimitedWriter::new(out);
            let refs: Vec<&RecordBatch> = batches.iter().collect();
            writer.write_batches(&refs).context(ArrowSnafu)?;
            writer.finish().context(ArrowSnafu)
        }
        OutputFormat::Table => Err(CliError::TableFormatToFile),
    }
}

pub fn write_to_file(
    path: &Path,
    schema: &Schema,
    batches: &[RecordBatch],
    format: OutputFormat,
) -> CliResult<()> {
    let file = File::create(path).context(WriteOutputSnafu {
        path: path.display().to_string(),
    })?;
    let mut out = BufWriter::new(file);
    write_batches(schema, batches, format, &mut out)?;
    out.flush().context(WriteOutputSnafu {
        path: path.display().to_string(),
    })
}

/// Print a scan result according to `opts`.
pub fn print_scan<W: Write>(
    columns: &[String],
    schema: &Schema,
    batches: &[RecordBatch],
    total_rows: usize,
    elapsed: Duration,
    opts: &ScanOpts,
    out: &mut W,
) -> CliResult<()> {
    let write_err = |e: std::io::Error| CliError::WriteOutput {
        path: "<stdout>".to_string(),
        source: e,
    };

    if let Some(path) = &opts.output {
        write_to_file(path, schema, batches, opts.format)?;
    } else if opts.format != OutputFormat::Table {
        return write_batches(schema, batches, opts.format, out);
    } else if opts.max_rows == 0 {
        if total_rows > 0 {
            writeln!(out, "(preview suppressed; use --max-rows > 0)").map_err(write_err)?;
        }
    } else if total_rows == 0 {
        writeln!(out, "{}", render_table(columns, &[])).map_err(write_err)?;
        writeln!(out, "(no rows)").map_err(write_err)?;
    } else {
        let rows = preview_rows(batches, opts.max_rows)?;
        writeln!(out, "{}", render_table(columns, &rows)).map_err(write_err)?;
    }

    writeln!(out, "total_rows: {total_rows}").map_err(write_err)?;
    if opts.timing {
        writeln!(out, "elapsed_ms: {}", elapsed.as_millis()).map_err(write_err)?;
    }
    if let Some(path) = &opts.output {
        writeln!(out, "wrote: {} ({:?})", path.display(), opts.format).map_err(write_err)?;
    }
    Ok(())
}
