//! CLI tool for inspecting and scanning Delta tables.

mod error;
mod filter;
mod render;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use delta_table_core::{DeltaTable, Projection, Snapshot, TableConfig};
use log::debug;
use snafu::ResultExt;

use crate::{
    error::{CliResult, LoadVersionSnafu, OpenTableSnafu, ScanSnafu, TableFormatToFileSnafu},
    render::{OutputFormat, ScanOpts, print_scan, render_table},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    Table,
    Csv,
    Jsonl,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(v: OutputFormatArg) -> Self {
        match v {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Csv => OutputFormat::Csv,
            OutputFormatArg::Jsonl => OutputFormat::Jsonl,
        }
    }
}

/// Reader tuning shared by every subcommand.
#[derive(Debug, Args)]
struct TuningArgs {
    /// Commit files read concurrently while replaying the log
    #[arg(long, global = true, default_value_t = 8)]
    log_read_concurrency: usize,

    /// Data files read concurrently while scanning
    #[arg(long, global = true, default_value_t = 4)]
    scan_concurrency: usize,

    /// Always replay from the nearest checkpoint instead of a cached snapshot
    #[arg(long, global = true, default_value_t = false)]
    no_snapshot_reuse: bool,

    /// Read every candidate file even when its statistics rule out the filter
    #[arg(long, global = true, default_value_t = false)]
    no_data_skipping: bool,
}

impl TuningArgs {
    fn config(&self) -> TableConfig {
        TableConfig::default()
            .with_log_read_concurrency(self.log_read_concurrency)
            .with_scan_concurrency(self.scan_concurrency)
            .with_reuse_cached_snapshots(!self.no_snapshot_reuse)
            .with_data_skipping(!self.no_data_skipping)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show version, checkpoint, partitioning and schema
    Info {
        /// Table root (local path or file:// URI)
        table: String,

        /// Inspect this version instead of the latest
        #[arg(long, allow_hyphen_values = true)]
        version: Option<i64>,
    },

    /// List commit and checkpoint versions in the log
    History {
        /// Table root (local path or file:// URI)
        table: String,
    },

    /// List live data files
    Files {
        /// Table root (local path or file:// URI)
        table: String,

        #[arg(long, allow_hyphen_values = true)]
        version: Option<i64>,
    },

    /// Read rows, optionally projected and filtered
    Scan {
        /// Table root (local path or file:// URI)
        table: String,

        #[arg(long, allow_hyphen_values = true)]
        version: Option<i64>,

        /// Comma-separated output columns (default: all, in schema order)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Repeatable row filter, e.g. "number2 = 0" or "name IS NULL"
        #[arg(long = "where")]
        filters: Vec<String>,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,

        #[arg(long, value_enum, default_value_t = OutputFormatArg::Table)]
        format: OutputFormatArg,

        /// Write all rows to this file (requires csv or jsonl)
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        timing: bool,
    },
}

#[derive(Debug, Parser)]
#[command(name = "delta-table")]
struct Cli {
    #[command(flatten)]
    tuning: TuningArgs,

    #[command(subcommand)]
    cmd: Command,
}

async fn open_table(table: &str, config: TableConfig) -> CliResult<DeltaTable> {
    DeltaTable::open_with_config(table, config)
        .await
        .context(OpenTableSnafu { table })
}

async fn snapshot_for(
    t: &DeltaTable,
    table: &str,
    version: Option<i64>,
) -> CliResult<Arc<Snapshot>> {
    match version {
        Some(v) => t
            .snapshot_at(v)
            .await
            .context(LoadVersionSnafu { table, version: v }),
        None => Ok(t.snapshot()),
    }
}

async fn cmd_info(table: &str, version: Option<i64>, config: TableConfig) -> CliResult<()> {
    let t = open_table(table, config).await?;
    let snapshot = snapshot_for(&t, table, version).await?;

    let checkpoint = t
        .checkpoint()
        .map_or_else(|| "none".to_string(), |v| v.to_string());
    let partitions = if snapshot.partition_columns().is_empty() {
        "(none)".to_string()
    } else {
        snapshot.partition_columns().join(", ")
    };
    let protocol = snapshot.protocol();

    println!("path: {}", t.path());
    println!("log_path: {}", t.log_path());
    println!("version: {}", snapshot.version());
    println!("latest_checkpoint: {checkpoint}");
    println!("partition_columns: {partitions}");
    println!("files: {}", snapshot.files().len());
    println!(
        "protocol: reader {}, writer {}",
        protocol.min_reader_version, protocol.min_writer_version
    );

    let columns = ["column", "type", "nullable", "partition"].map(String::from);
    let rows: Vec<Vec<String>> = snapshot
        .schema()
        .fields()
        .iter()
        .map(|f| {
            vec![
                f.name.clone(),
                f.data_type.to_string(),
                f.nullable.to_string(),
                snapshot.is_partition_column(&f.name).to_string(),
            ]
        })
        .collect();
    println!("{}", render_table(&columns, &rows));
    Ok(())
}

async fn cmd_history(table: &str, config: TableConfig) -> CliResult<()> {
    let t = open_table(table, config).await?;
    let commits: BTreeSet<u64> = t.commit_versions().into_iter().collect();
    let checkpoints: BTreeSet<u64> = t.checkpoint_versions().into_iter().collect();

    let columns = ["version", "commit", "checkpoint"].map(String::from);
    let rows: Vec<Vec<String>> = commits
        .union(&checkpoints)
        .map(|v| {
            vec![
                v.to_string(),
                commits.contains(v).to_string(),
                checkpoints.contains(v).to_string(),
            ]
        })
        .collect();
    println!("{}", render_table(&columns, &rows));
    println!("latest: {}", t.version());
    Ok(())
}

async fn cmd_files(table: &str, version: Option<i64>, config: TableConfig) -> CliResult<()> {
    let t = open_table(table, config).await?;
    let snapshot = snapshot_for(&t, table, version).await?;

    let columns = ["path", "size", "records", "partition_values", "added_in"].map(String::from);
    let rows: Vec<Vec<String>> = snapshot
        .files()
        .iter()
        .map(|f| {
            let mut partition_values: Vec<String> = f
                .add
                .partition_values
                .iter()
                .map(|(k, v)| format!("{k}={}", v.as_deref().unwrap_or("null")))
                .collect();
            partition_values.sort();
            let records = f
                .add
                .parsed_stats()
                .and_then(|s| s.num_records)
                .map_or_else(|| "-".to_string(), |n| n.to_string());
            vec![
                f.add.path.clone(),
                f.add.size.to_string(),
                records,
                partition_values.join(","),
                f.version.to_string(),
            ]
        })
        .collect();
    println!("{}", render_table(&columns, &rows));
    println!("total_files: {} (version {})", rows.len(), snapshot.version());
    Ok(())
}

struct ScanArgs {
    table: String,
    version: Option<i64>,
    columns: Vec<String>,
    filters: Vec<String>,
    opts: ScanOpts,
}

async fn cmd_scan(args: ScanArgs, config: TableConfig) -> CliResult<()> {
    if args.opts.output.is_some() && args.opts.format == OutputFormat::Table {
        return TableFormatToFileSnafu.fail();
    }
    let filter = filter::parse_filters(&args.filters)?;
    if let Some(f) = &filter {
        debug!("scan filter: {f}");
    }
    let projection = if args.columns.is_empty() {
        Projection::All
    } else {
        Projection::columns(args.columns.iter().map(|c| c.trim()))
    };

    let t = open_table(&args.table, config).await?;
    let snapshot = snapshot_for(&t, &args.table, args.version).await?;

    let start = Instant::now();
    let result = t
        .scan(&snapshot, projection, filter)
        .await
        .context(ScanSnafu {
            table: args.table.as_str(),
        })?;
    let elapsed = start.elapsed();

    let columns: Vec<String> = result.column_names().into_iter().map(String::from).collect();
    let schema = result.schema();
    let mut stdout = std::io::stdout();
    print_scan(
        &columns,
        schema.as_ref(),
        result.batches(),
        result.num_rows(),
        elapsed,
        &args.opts,
        &mut stdout,
    )
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = cli.tuning.config();

    match cli.cmd {
        Command::Info { table, version } => cmd_info(&table, version, config).await,
        Command::History { table } => cmd_history(&table, config).await,
        Command::Files { table, version } => cmd_files(&table, version, config).await,
        Command::Scan {
            table,
            version,
            columns,
            filters,
            max_rows,
            format,
            output,
            timing,
        } => {
            cmd_scan(
                ScanArgs {
                    table,
                    version,
                    columns,
                    filters,
                    opts: ScanOpts {
                        timing,
                        max_rows,
                        output,
                        format: format.into(),
                    },
                },
                config,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}
