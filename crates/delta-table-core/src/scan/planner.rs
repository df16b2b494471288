//! Splitting a projection and filter into a scan plan.
//!
//! The filter is split at its top-level conjunctions: a conjunct that only
//! references partition columns goes to the file index, everything else
//! stays in the residual that is evaluated on rows. Since the original filter
//! is the AND of all conjuncts, `partition_filter AND residual` is the
//! original filter for every row of every file.
use snafu::prelude::*;

use crate::expression::Predicate;
use crate::snapshot::Snapshot;
use crate::table::error::{TableError, UnknownColumnSnafu};

/// Columns a caller wants back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Every column of the effective schema, in schema order.
    #[default]
    All,
    /// The named columns, in the given order.
    Columns(Vec<String>),
}

impl Projection {
    /// Project onto `columns`.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Columns(columns.into_iter().map(Into::into).collect())
    }
}

/// The result of planning a scan. No I/O has happened yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    /// Output columns, in output order.
    pub output_columns: Vec<String>,
    /// Columns that must be materialised per file: the output columns plus
    /// any column the residual needs, in schema order.
    pub read_columns: Vec<String>,
    /// Filter on partition columns only, for the file index.
    pub partition_filter: Option<Predicate>,
    /// Filter evaluated on rows, bound to the snapshot schema.
    pub residual: Option<Predicate>,
}

/// Computes scan plans against one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PushdownPlanner<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> PushdownPlanner<'a> {
    /// Planner for `snapshot`.
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    /// Plan a scan of `projection` filtered by `filter`.
    ///
    /// Fails with `UnknownColumn` when either names a column that is not in
    /// the snapshot's effective schema.
    pub fn plan(
        &self,
        projection: &Projection,
        filter: Option<&Predicate>,
    ) -> Result<ScanPlan, TableError> {
        let schema = self.snapshot.schema();

        let output_columns: Vec<String> = match projection {
            Projection::All => schema.field_names().map(str::to_string).collect(),
            Projection::Columns(columns) => {
                for column in columns {
                    ensure!(
                        schema.field(column).is_some(),
                        UnknownColumnSnafu { column: column.as_str() }
                    );
                }
                columns.clone()
            }
        };

        let (partition_filter, residual) = match filter {
            None => (None, None),
            Some(filter) => {
                let bound = filter.bind(schema)?;
                let (partition, rest): (Vec<_>, Vec<_>) =
                    bound.conjuncts().into_iter().partition(|conjunct| {
                        conjunct
                            .columns()
                            .iter()
                            .all(|c| self.snapshot.is_partition_column(c))
                    });
                (
                    Predicate::conjunction(partition),
                    Predicate::conjunction(rest),
                )
            }
        };

        let residual_columns = residual
            .as_ref()
            .map(|r| r.columns())
            .unwrap_or_default();
        let read_columns = schema
            .field_names()
            .filter(|name| output_columns.iter().any(|c| c == name) || residual_columns.contains(name))
            .map(str::to_string)
            .collect();

        Ok(ScanPlan {
            output_columns,
            read_columns,
            partition_filter,
            residual,
        })
    }
}
