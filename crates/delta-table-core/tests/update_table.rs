#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! A table where a later commit rewrites one file in place of another.

mod common;

use std::collections::BTreeMap;

use common::*;
use delta_table_core::{col, Projection};
use serde_json::json;

/// Twelve appends, a checkpoint at 10, then version 12 rewrites the file
/// holding id 0 with `number = 123` for that row.
fn updated_table() -> TestResult<TableFixture> {
    let mut fixture = append_table()?;

    let old_path = "number2=0/part-00000-0.parquet";
    let ids: Vec<i64> = (0..ROWS_PER_APPEND / 2).collect();
    let batch = fixture.rows(&ids, &BTreeMap::from([(0, 123.0)]))?;
    let add = fixture.write_data_file("number2=0/part-00012-rewrite.parquet", 0, &batch)?;
    fixture.commit(vec![
        json!({"remove": {"path": old_path, "deletionTimestamp": 12, "dataChange": true}}),
        add,
    ])?;
    Ok(fixture)
}

#[tokio::test]
async fn rewrite_moves_version_but_not_checkpoint() -> TestResult {
    let fixture = updated_table()?;
    let table = fixture.open().await?;

    assert_eq!(table.version(), 12);
    assert_eq!(table.checkpoint(), Some(10));
    assert_eq!(table.files().len(), 24);
    assert!(!table
        .files()
        .iter()
        .any(|p| p == "number2=0/part-00000-0.parquet"));
    Ok(())
}

#[tokio::test]
async fn rewritten_row_is_visible_once() -> TestResult {
    let fixture = updated_table()?;
    let table = fixture.open().await?;

    let all = table.to_table(Projection::All, None).await?;
    assert_eq!(all.num_rows(), 12_000);
    assert_eq!(sorted_ids(&all).len(), 12_000);

    let hit = table
        .to_table(Projection::columns(["id", "number"]), Some(col("number").eq(123.0)))
        .await?;
    assert_eq!(sorted_ids(&hit), vec![0]);
    assert_eq!(doubles(&hit, "number"), vec![Some(123.0)]);
    Ok(())
}

#[tokio::test]
async fn previous_version_still_sees_old_file() -> TestResult {
    let fixture = updated_table()?;
    let table = fixture.open().await?;

    let v11 = table.snapshot_at(11).await?;
    assert!(v11.files().contains("number2=0/part-00000-0.parquet"));
    assert!(!v11.files().contains("number2=0/part-00012-rewrite.parquet"));

    let hit = table
        .scan(&v11, Projection::All, Some(col("number").eq(123.0)))
        .await?;
    assert_eq!(hit.num_rows(), 0);
    Ok(())
}
