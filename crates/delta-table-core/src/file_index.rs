//! Partition index over a snapshot's live files.
//!
//! Files are grouped by their partition value tuple, and a partition
//! predicate is evaluated once per distinct tuple against the typed
//! partition values. No data file is opened.
//!
//! A file whose partition value is null (absent from `partitionValues`, JSON
//! null, or the empty string) only matches predicates that test for null:
//! comparisons with a null operand are unknown, and unknown does not match.
use std::collections::HashMap;

use snafu::prelude::*;

use crate::expression::{Predicate, Scalar};
use crate::schema::PrimitiveType;
use crate::snapshot::{LiveFile, Snapshot};
use crate::table::error::{InvalidPartitionValueSnafu, PartitionPredicateSnafu, TableError};

pub mod stats;

/// One distinct partition value tuple and the files that carry it.
#[derive(Debug)]
struct PartitionGroup<'a> {
    values: HashMap<String, Scalar>,
    /// (position in live order, file)
    files: Vec<(usize, &'a LiveFile)>,
}

/// Live files of one snapshot, indexed by partition values.
#[derive(Debug)]
pub struct FileSetIndex<'a> {
    snapshot: &'a Snapshot,
    groups: Vec<PartitionGroup<'a>>,
}

impl<'a> FileSetIndex<'a> {
    /// Build the index for `snapshot`.
    ///
    /// Fails with `InvalidPartitionValue` when a live file records a value
    /// that does not parse as its partition column's type.
    pub fn new(snapshot: &'a Snapshot) -> Result<Self, TableError> {
        let columns: Vec<(&str, PrimitiveType)> = snapshot
            .partition_fields()
            .into_iter()
            .map(|f| (f.name.as_str(), f.data_type.as_primitive().unwrap_or(PrimitiveType::String)))
            .collect();

        let mut by_tuple: HashMap<Vec<Option<&'a str>>, usize> = HashMap::new();
        let mut groups: Vec<PartitionGroup<'a>> = Vec::new();

        for (position, file) in snapshot.files().iter().enumerate() {
            let raw: Vec<Option<&'a str>> = columns
                .iter()
                .map(|(name, _)| file.add.partition_value(name).filter(|v| !v.is_empty()))
                .collect();

            if let Some(&group) = by_tuple.get(&raw) {
                groups[group].files.push((position, file));
                continue;
            }

            let mut values = HashMap::with_capacity(columns.len());
            for ((name, ty), value) in columns.iter().zip(&raw) {
                let typed = match value {
                    None => Scalar::Null,
                    Some(v) => Scalar::parse(v, *ty).ok().context(InvalidPartitionValueSnafu {
                        column: *name,
                        value: *v,
                        path: file.path(),
                    })?,
                };
                values.insert(name.to_string(), typed);
            }

            by_tuple.insert(raw, groups.len());
            groups.push(PartitionGroup {
                values,
                files: vec![(position, file)],
            });
        }

        Ok(FileSetIndex { snapshot, groups })
    }

    /// Number of live files.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }

    /// Whether the snapshot has no live files.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of distinct partition value tuples.
    pub fn partition_count(&self) -> usize {
        self.groups.len()
    }

    /// Files whose partition values satisfy `predicate`, in live order.
    ///
    /// `None` selects every live file. A predicate that references a column
    /// which is not a partition column fails with `PartitionPredicate`; an
    /// unknown column or an incomparable literal fails like
    /// [`Predicate::bind`].
    pub fn files_matching(
        &self,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<&'a LiveFile>, TableError> {
        let bound = match predicate {
            None => None,
            Some(p) => {
                let bound = p.bind(self.snapshot.schema())?;
                for column in p.columns() {
                    ensure!(
                        self.snapshot.is_partition_column(column),
                        PartitionPredicateSnafu { column }
                    );
                }
                Some(bound)
            }
        };

        let mut selected: Vec<(usize, &'a LiveFile)> = self
            .groups
            .iter()
            .filter(|g| match &bound {
                None => true,
                Some(p) => p.evaluate(&|c| g.values.get(c)) == Some(true),
            })
            .flat_map(|g| g.files.iter().copied())
            .collect();
        selected.sort_unstable_by_key(|(position, _)| *position);
        Ok(selected.into_iter().map(|(_, f)| f).collect())
    }
}
