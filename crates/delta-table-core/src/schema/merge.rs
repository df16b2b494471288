//! Folding successive `metaData` schemas into the effective schema.
//!
//! Rules applied when a later schema replaces an earlier one while files
//! written under the earlier schema are still live:
//!
//! - Columns keep the position they had in the earlier schema; columns that
//!   are new in the later schema are appended as nullable.
//! - A column missing from the later schema is kept, as nullable, so files
//!   written before it disappeared still expose their data and newer files
//!   read it as null.
//! - A column present in both must have the same or a wider type
//!   (`byte < short < integer < long`, integral types to `double`,
//!   `float` to `double`, `date` to `timestamp_ntz`, and decimals whose
//!   integral and fractional digits both grow). Structs, arrays and maps are
//!   compared element-wise.
//! - A nullable column cannot become non-nullable.
//!
//! When no earlier file is live the later schema is taken as-is, which is how
//! a table overwrite may legitimately drop or narrow columns.
//!
//! Partition columns never change once set.
use std::collections::HashSet;

use snafu::prelude::*;

use crate::schema::{ArrayType, DataType, MapType, PrimitiveType, StructField, StructType};

/// Errors raised when a schema change cannot be applied.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaEvolutionError {
    /// A `metaData` action changed the partition columns.
    #[snafu(display("Partition columns changed from {previous:?} to {proposed:?}"))]
    PartitionColumnsChanged {
        /// Partition columns before the change.
        previous: Vec<String>,
        /// Partition columns after the change.
        proposed: Vec<String>,
    },

    /// A column's type changed to one that cannot hold all existing values.
    #[snafu(display("Column {column} cannot change type from {from} to {to}"))]
    IncompatibleType {
        /// Column path (`a.b` for nested fields).
        column: String,
        /// Type before the change.
        from: String,
        /// Type after the change.
        to: String,
    },

    /// A nullable column became non-nullable while files that may hold nulls
    /// are live.
    #[snafu(display("Column {column} cannot become non-nullable"))]
    NullabilityNarrowed {
        /// Column path.
        column: String,
    },

    /// The schema itself is not acceptable.
    #[snafu(display("Invalid table schema: {msg}"))]
    InvalidSchema {
        /// A description of the problem.
        msg: String,
    },
}

/// A convenience type alias for results of schema evolution operations.
pub type MergeResult<T> = Result<T, SchemaEvolutionError>;

/// Check a schema and its partition columns on their own.
///
/// Field names must be unique at every nesting level; every partition column
/// must be a top-level primitive column.
pub fn validate_schema(schema: &StructType, partition_columns: &[String]) -> MergeResult<()> {
    check_unique_names(schema, "")?;

    let mut seen = HashSet::new();
    for col in partition_columns {
        ensure!(
            seen.insert(col.as_str()),
            InvalidSchemaSnafu {
                msg: format!("partition column {col} listed twice"),
            }
        );
        let field = schema.field(col).context(InvalidSchemaSnafu {
            msg: format!("partition column {col} is not in the schema"),
        })?;
        ensure!(
            field.data_type.as_primitive().is_some(),
            InvalidSchemaSnafu {
                msg: format!("partition column {col} must have a primitive type"),
            }
        );
    }
    Ok(())
}

fn check_unique_names(schema: &StructType, path: &str) -> MergeResult<()> {
    let mut seen = HashSet::new();
    for field in &schema.fields {
        let field_path = join_path(path, &field.name);
        ensure!(
            seen.insert(field.name.as_str()),
            InvalidSchemaSnafu {
                msg: format!("duplicate column {field_path}"),
            }
        );
        if let DataType::Struct(inner) = &field.data_type {
            check_unique_names(inner, &field_path)?;
        }
    }
    Ok(())
}

/// Partition columns must stay exactly the same.
pub fn check_partition_columns(previous: &[String], proposed: &[String]) -> MergeResult<()> {
    ensure!(
        previous == proposed,
        PartitionColumnsChangedSnafu {
            previous: previous.to_vec(),
            proposed: proposed.to_vec(),
        }
    );
    Ok(())
}

/// Merge `proposed` into the `previous` effective schema.
///
/// With `allow_narrowing` (no file written under `previous` is still live)
/// the proposed schema replaces the previous one unchanged.
pub fn merge_schema(
    previous: &StructType,
    proposed: &StructType,
    allow_narrowing: bool,
) -> MergeResult<StructType> {
    if allow_narrowing {
        return Ok(proposed.clone());
    }
    merge_struct(previous, proposed, "")
}

fn merge_struct(previous: &StructType, proposed: &StructType, path: &str) -> MergeResult<StructType> {
    let mut fields = Vec::with_capacity(previous.fields.len().max(proposed.fields.len()));

    for old in &previous.fields {
        let field_path = join_path(path, &old.name);
        match proposed.field(&old.name) {
            Some(new) => fields.push(merge_field(old, new, &field_path)?),
            None => fields.push(old.clone().with_nullable(true)),
        }
    }

    for new in &proposed.fields {
        if previous.field(&new.name).is_none() {
            fields.push(new.clone().with_nullable(true));
        }
    }

    Ok(StructType::new(fields))
}

fn merge_field(old: &StructField, new: &StructField, path: &str) -> MergeResult<StructField> {
    ensure!(
        !(old.nullable && !new.nullable),
        NullabilityNarrowedSnafu { column: path }
    );

    let data_type = merge_type(&old.data_type, &new.data_type, path)?;
    Ok(StructField {
        name: old.name.clone(),
        data_type,
        nullable: new.nullable,
        metadata: new.metadata.clone(),
    })
}

fn merge_type(old: &DataType, new: &DataType, path: &str) -> MergeResult<DataType> {
    match (old, new) {
        (DataType::Primitive(a), DataType::Primitive(b)) => {
            if a == b || is_widening(*a, *b) {
                Ok(new.clone())
            } else {
                incompatible(path, old, new)
            }
        }
        (DataType::Struct(a), DataType::Struct(b)) => Ok(merge_struct(a, b, path)?.into()),
        (DataType::Array(a), DataType::Array(b)) => {
            let elem_path = format!("{path}.element");
            ensure!(
                !(a.contains_null && !b.contains_null),
                NullabilityNarrowedSnafu { column: elem_path }
            );
            let element = merge_type(&a.element_type, &b.element_type, &elem_path)?;
            Ok(ArrayType::new(element, b.contains_null).into())
        }
        (DataType::Map(a), DataType::Map(b)) => {
            let key = merge_type(&a.key_type, &b.key_type, &format!("{path}.key"))?;
            let value_path = format!("{path}.value");
            ensure!(
                !(a.value_contains_null && !b.value_contains_null),
                NullabilityNarrowedSnafu { column: value_path }
            );
            let value = merge_type(&a.value_type, &b.value_type, &value_path)?;
            Ok(MapType::new(key, value, b.value_contains_null).into())
        }
        _ => incompatible(path, old, new),
    }
}

fn incompatible<T>(path: &str, old: &DataType, new: &DataType) -> MergeResult<T> {
    IncompatibleTypeSnafu {
        column: path,
        from: old.to_string(),
        to: new.to_string(),
    }
    .fail()
}

/// Whether every value of `from` is representable in `to`.
pub fn is_widening(from: PrimitiveType, to: PrimitiveType) -> bool {
    use PrimitiveType::*;

    if let (Some(a), Some(b)) = (from.integer_rank(), to.integer_rank()) {
        return a < b;
    }
    match (from, to) {
        (Byte | Short | Integer, Double) => true,
        (Float, Double) => true,
        (Date, TimestampNtz) => true,
        (
            Decimal {
                precision: p1,
                scale: s1,
            },
            Decimal {
                precision: p2,
                scale: s2,
            },
        ) => s2 >= s1 && (p2 - s2) >= (p1 - s1),
        _ => false,
    }
}

fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}.{child}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: PrimitiveType, nullable: bool) -> StructField {
        StructField::new(name, ty, nullable)
    }

    fn base() -> StructType {
        StructType::new(vec![
            field("id", PrimitiveType::Long, true),
            field("number", PrimitiveType::Double, true),
            field("number2", PrimitiveType::Long, true),
        ])
    }

    #[test]
    fn new_column_is_appended_nullable() {
        let mut proposed = base();
        proposed
            .fields
            .insert(0, field("number3", PrimitiveType::Double, false));

        let merged = merge_schema(&base(), &proposed, false).expect("merge");
        assert_eq!(
            merged.field_names().collect::<Vec<_>>(),
            vec!["id", "number", "number2", "number3"]
        );
        assert!(merged.field("number3").map(|f| f.nullable).unwrap_or(false));
    }

    #[test]
    fn dropped_column_is_retained_while_old_files_are_live() {
        let proposed = StructType::new(vec![
            field("id", PrimitiveType::Long, true),
            field("number2", PrimitiveType::Long, true),
        ]);
        let merged = merge_schema(&base(), &proposed, false).expect("merge");
        assert_eq!(
            merged.field_names().collect::<Vec<_>>(),
            vec!["id", "number", "number2"]
        );
    }

    #[test]
    fn narrowing_is_allowed_without_live_files() {
        let proposed = StructType::new(vec![field("id", PrimitiveType::Integer, false)]);
        let merged = merge_schema(&base(), &proposed, true).expect("replace");
        assert_eq!(merged, proposed);
    }

    #[test]
    fn type_widening_is_accepted() {
        let old = StructType::new(vec![
            field("a", PrimitiveType::Integer, true),
            field("b", PrimitiveType::Float, true),
            field("c", PrimitiveType::Date, true),
        ]);
        let new = StructType::new(vec![
            field("a", PrimitiveType::Long, true),
            field("b", PrimitiveType::Double, true),
            field("c", PrimitiveType::TimestampNtz, true),
        ]);
        assert_eq!(merge_schema(&old, &new, false).expect("widen"), new);
    }

    #[test]
    fn type_narrowing_is_rejected() {
        let new = StructType::new(vec![
            field("id", PrimitiveType::Integer, true),
            field("number", PrimitiveType::Double, true),
            field("number2", PrimitiveType::Long, true),
        ]);
        let err = merge_schema(&base(), &new, false).expect_err("narrowing");
        assert!(matches!(err, SchemaEvolutionError::IncompatibleType { ref column, .. } if column == "id"));

        let new = StructType::new(vec![field("number", PrimitiveType::String, true)]);
        let err = merge_schema(&base(), &new, false).expect_err("unrelated");
        assert!(matches!(err, SchemaEvolutionError::IncompatibleType { .. }));
    }

    #[test]
    fn nullable_to_required_is_rejected() {
        let new = StructType::new(vec![field("id", PrimitiveType::Long, false)]);
        let err = merge_schema(&base(), &new, false).expect_err("narrowed");
        assert_eq!(
            err,
            SchemaEvolutionError::NullabilityNarrowed {
                column: "id".to_string()
            }
        );
    }

    #[test]
    fn nested_struct_fields_are_merged() {
        let old = StructType::new(vec![StructField::new(
            "point",
            StructType::new(vec![field("x", PrimitiveType::Integer, true)]),
            true,
        )]);
        let new = StructType::new(vec![StructField::new(
            "point",
            StructType::new(vec![
                field("x", PrimitiveType::Long, true),
                field("y", PrimitiveType::Long, true),
            ]),
            true,
        )]);
        let merged = merge_schema(&old, &new, false).expect("merge");
        assert_eq!(merged, new);

        let bad = StructType::new(vec![StructField::new(
            "point",
            StructType::new(vec![field("x", PrimitiveType::Short, true)]),
            true,
        )]);
        let err = merge_schema(&old, &bad, false).expect_err("nested narrowing");
        assert!(matches!(err, SchemaEvolutionError::IncompatibleType { ref column, .. } if column == "point.x"));
    }

    #[test]
    fn decimal_widening_rules() {
        let d = |precision, scale| PrimitiveType::Decimal { precision, scale };
        assert!(is_widening(d(10, 2), d(12, 2)));
        assert!(is_widening(d(10, 2), d(12, 4)));
        assert!(!is_widening(d(10, 2), d(11, 4)));
        assert!(!is_widening(d(10, 2), d(10, 1)));
        assert!(!is_widening(PrimitiveType::Long, PrimitiveType::Integer));
        assert!(!is_widening(PrimitiveType::Long, PrimitiveType::Double));
    }

    #[test]
    fn partition_columns_must_not_change() {
        let a = vec!["number2".to_string()];
        let b = vec!["number".to_string()];
        check_partition_columns(&a, &a).expect("same");
        let err = check_partition_columns(&a, &b).expect_err("changed");
        assert!(matches!(err, SchemaEvolutionError::PartitionColumnsChanged { .. }));
    }

    #[test]
    fn validate_rejects_bad_schemas() {
        validate_schema(&base(), &["number2".to_string()]).expect("valid");

        let err = validate_schema(&base(), &["missing".to_string()]).expect_err("missing");
        assert!(matches!(err, SchemaEvolutionError::InvalidSchema { .. }));

        let dup = StructType::new(vec![
            field("a", PrimitiveType::Long, true),
            field("a", PrimitiveType::Long, true),
        ]);
        assert!(validate_schema(&dup, &[]).is_err());

        let nested = StructType::new(vec![StructField::new(
            "s",
            StructType::new(vec![field("x", PrimitiveType::Long, true)]),
            true,
        )]);
        assert!(validate_schema(&nested, &["s".to_string()]).is_err());
    }
}
