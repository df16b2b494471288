#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end reads of a table built by twelve appends with a checkpoint.

mod common;

use std::collections::HashSet;
use std::fs;

use common::*;
use delta_table_core::{col, DeltaTable, Projection, TableConfig, TableError};

#[tokio::test]
async fn opens_at_latest_version_with_checkpoint() -> TestResult {
    let fixture = append_table()?;
    let table = fixture.open().await?;

    assert_eq!(table.version(), 11);
    assert_eq!(table.checkpoint(), Some(10));
    assert_eq!(table.commit_versions(), (0..=11).collect::<Vec<_>>());
    assert_eq!(table.partition_columns(), vec!["number2".to_string()]);
    assert_eq!(table.files().len(), 24);
    assert!(table.log_path().ends_with("_delta_log"));

    let names: Vec<String> = table
        .schema()
        .field_names()
        .map(str::to_string)
        .collect();
    assert_eq!(names, vec!["id", "number", "number2"]);
    Ok(())
}

#[tokio::test]
async fn full_scan_returns_every_row_once() -> TestResult {
    let fixture = append_table()?;
    let table = fixture.open().await?;

    let result = table.to_table(Projection::All, None).await?;
    assert_eq!(result.num_rows(), 12_000);
    assert_eq!(result.column_names(), vec!["id", "number", "number2"]);

    let ids = sorted_ids(&result);
    let unique: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 12_000);
    assert_eq!(ids.first(), Some(&0));
    assert_eq!(ids.last(), Some(&11_999));
    Ok(())
}

#[tokio::test]
async fn partition_filter_selects_half() -> TestResult {
    let fixture = append_table()?;
    let table = fixture.open().await?;

    let result = table
        .to_table(Projection::All, Some(col("number2").eq(0)))
        .await?;
    assert_eq!(result.num_rows(), 6_000);

    let batch = result.to_record_batch()?;
    let partition = batch
        .column_by_name("number2")
        .expect("partition column")
        .as_any()
        .downcast_ref::<arrow::array::Int32Array>()
        .expect("number2 is Int32");
    assert!(partition.iter().all(|v| v == Some(0)));
    Ok(())
}

#[tokio::test]
async fn residual_filter_applies_to_rows() -> TestResult {
    let fixture = append_table()?;
    let table = fixture.open().await?;

    let result = table
        .to_table(Projection::All, Some(col("number").lt(0.5)))
        .await?;
    let n = result.num_rows();
    assert!(n > 0 && n < 12_000, "unexpected row count {n}");
    assert!(doubles(&result, "number")
        .into_iter()
        .all(|v| v.is_some_and(|x| x < 0.5)));
    Ok(())
}

#[tokio::test]
async fn projection_orders_columns_as_requested() -> TestResult {
    let fixture = append_table()?;
    let table = fixture.open().await?;

    let result = table
        .to_table(Projection::columns(["number", "number2"]), None)
        .await?;
    assert_eq!(result.column_names(), vec!["number", "number2"]);
    assert_eq!(result.num_rows(), 12_000);

    let reordered = table
        .to_table(
            Projection::columns(["number2", "id"]),
            Some(col("number2").eq(1).and(col("id").lt(500))),
        )
        .await?;
    assert_eq!(reordered.column_names(), vec!["number2", "id"]);
    // Ids 0..500 of the first append all landed in partition 0.
    assert_eq!(reordered.num_rows(), 0);
    Ok(())
}

#[tokio::test]
async fn time_travel_to_earlier_version() -> TestResult {
    let fixture = append_table()?;
    let table = fixture.open().await?;

    let v5 = table.snapshot_at(5).await?;
    assert_eq!(v5.version(), 5);
    assert_eq!(v5.checkpoint_version(), None);
    assert_eq!(v5.files().len(), 12);

    let rows = table.scan(&v5, Projection::All, None).await?;
    assert_eq!(rows.num_rows(), 6_000);
    assert_eq!(sorted_ids(&rows).last(), Some(&5_999));

    // Resolving does not move the current snapshot; loading does.
    assert_eq!(table.version(), 11);
    table.load_version(5).await?;
    assert_eq!(table.version(), 5);
    assert_eq!(table.files().len(), 12);

    let v11 = table.snapshot_at(11).await?;
    assert_eq!(v11.files().len(), 24);
    Ok(())
}

#[tokio::test]
async fn invalid_versions_are_rejected() -> TestResult {
    let fixture = append_table()?;
    let table = fixture.open().await?;

    for bad in [-1, 12, 100] {
        let err = table.snapshot_at(bad).await.expect_err("out of range");
        assert!(
            matches!(err, TableError::VersionNotFound { requested, latest: 11, .. } if requested == bad),
            "unexpected error for {bad}: {err}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn checkpoint_agrees_with_full_replay() -> TestResult {
    let fixture = append_table()?;
    let table = fixture.open().await?;
    let with_checkpoint = table.snapshot();
    let boundary = table.snapshot_at(10).await?;
    assert_eq!(with_checkpoint.checkpoint_version(), Some(10));
    assert_eq!(boundary.checkpoint_version(), Some(10));

    fs::remove_file(
        fixture
            .log_dir()
            .join(format!("{:020}.checkpoint.parquet", 10)),
    )?;
    fs::remove_file(fixture.log_dir().join("_last_checkpoint"))?;
    let reopened = fixture.open().await?;
    let replayed = reopened.snapshot();
    assert_eq!(replayed.checkpoint_version(), None);
    assert_eq!(*reopened.snapshot_at(10).await?, *boundary);

    assert_eq!(replayed.version(), with_checkpoint.version());
    assert_eq!(replayed.schema(), with_checkpoint.schema());
    assert_eq!(replayed.partition_columns(), with_checkpoint.partition_columns());
    let mut a = replayed.file_paths();
    let mut b = with_checkpoint.file_paths();
    a.sort_unstable();
    b.sort_unstable();
    assert_eq!(a, b);
    Ok(())
}

#[tokio::test]
async fn config_does_not_change_results() -> TestResult {
    let fixture = append_table()?;
    let filter = col("number").gt_eq(0.25).and(col("number2").eq(1));

    let reference = fixture.open().await?;
    let expected = sorted_ids(&reference.to_table(Projection::All, Some(filter.clone())).await?);

    for config in [
        TableConfig::default().with_data_skipping(false),
        TableConfig::default()
            .with_scan_concurrency(1)
            .with_log_read_concurrency(1),
        TableConfig::default()
            .with_scan_concurrency(16)
            .with_reuse_cached_snapshots(false),
    ] {
        let table = fixture.open_with(config.clone()).await?;
        let got = sorted_ids(&table.to_table(Projection::All, Some(filter.clone())).await?);
        assert_eq!(got, expected, "config {config:?}");
    }
    Ok(())
}

#[tokio::test]
async fn statistics_skip_files_outside_range() -> TestResult {
    let fixture = append_table()?;
    let table = fixture.open().await?;

    // Each file covers 500 consecutive ids, so only one file can match.
    let result = table
        .to_table(Projection::columns(["id"]), Some(col("id").eq(7_250)))
        .await?;
    assert_eq!(sorted_ids(&result), vec![7_250]);
    Ok(())
}

#[tokio::test]
async fn update_picks_up_new_commits() -> TestResult {
    let mut fixture = append_table()?;
    let table = fixture.open().await?;
    assert_eq!(table.version(), 11);

    fixture.append(12, &[])?;
    assert_eq!(table.version(), 11);
    assert_eq!(table.update().await?, 12);
    assert_eq!(table.version(), 12);
    assert_eq!(
        table.to_table(Projection::All, None).await?.num_rows(),
        13_000
    );
    Ok(())
}

#[tokio::test]
async fn file_uri_and_plain_path_open_the_same_table() -> TestResult {
    let fixture = append_table()?;
    let uri = format!("file://{}", fixture.root_str());
    let by_uri = DeltaTable::open(&uri).await?;
    let by_path = fixture.open().await?;
    assert_eq!(by_uri.version(), by_path.version());
    assert_eq!(by_uri.files().len(), by_path.files().len());
    Ok(())
}
