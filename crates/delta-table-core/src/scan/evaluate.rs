//! Evaluating a bound [`Predicate`] over an Arrow batch.
//!
//! Comparisons use Arrow's `cmp` kernels with a one-element literal wrapped
//! in [`arrow::array::Scalar`], so the literal is broadcast without
//! materialising a full-length array. AND/OR use the Kleene variants, which
//! gives the same three-valued logic as [`Predicate::evaluate`]; a null in
//! the resulting mask drops the row in `filter_record_batch`.
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::kernels::boolean::{and_kleene, is_not_null, is_null, not, or_kleene};
use arrow::compute::kernels::cast::cast;
use arrow::compute::kernels::cmp;
use arrow::datatypes::DataType as ArrowDataType;
use arrow::record_batch::RecordBatch;
use snafu::prelude::*;

use crate::expression::{ComparisonOp, Predicate, Scalar};
use crate::table::error::{ArrowSnafu, InvalidPredicateSnafu, TableError};

/// Row mask for `predicate` over `batch`.
///
/// `predicate` must be bound to the schema `batch` was built with.
pub fn evaluate_predicate(
    batch: &RecordBatch,
    predicate: &Predicate,
) -> Result<BooleanArray, TableError> {
    let mask = match predicate {
        Predicate::Comparison { column, op, value } => {
            compare(column_of(batch, column)?, *op, value)?
        }
        Predicate::IsNull(column) => is_null(column_of(batch, column)?.as_ref()).context(ArrowSnafu)?,
        Predicate::IsNotNull(column) => {
            is_not_null(column_of(batch, column)?.as_ref()).context(ArrowSnafu)?
        }
        Predicate::And(l, r) => and_kleene(
            &evaluate_predicate(batch, l)?,
            &evaluate_predicate(batch, r)?,
        )
        .context(ArrowSnafu)?,
        Predicate::Or(l, r) => or_kleene(
            &evaluate_predicate(batch, l)?,
            &evaluate_predicate(batch, r)?,
        )
        .context(ArrowSnafu)?,
        Predicate::Not(inner) => not(&evaluate_predicate(batch, inner)?).context(ArrowSnafu)?,
    };
    Ok(mask)
}

fn column_of<'b>(batch: &'b RecordBatch, column: &str) -> Result<&'b ArrayRef, TableError> {
    batch.column_by_name(column).context(InvalidPredicateSnafu {
        msg: format!("column {column} is not part of the scanned batch"),
    })
}

fn compare(column: &ArrayRef, op: ComparisonOp, value: &Scalar) -> Result<BooleanArray, TableError> {
    // Integral and floating point literals compare against the column
    // widened to 64 bits; other literals are cast to the column's type.
    let (left, literal): (ArrayRef, ArrayRef) = match value {
        Scalar::Null => return Ok(BooleanArray::new_null(column.len())),
        Scalar::Long(v) => (
            widen(column, &ArrowDataType::Int64)?,
            Arc::new(Int64Array::from(vec![*v])),
        ),
        Scalar::Double(v) => (
            widen(column, &ArrowDataType::Float64)?,
            Arc::new(Float64Array::from(vec![*v])),
        ),
        other => {
            let literal = literal_array(other)?;
            let literal = if literal.data_type() == column.data_type() {
                literal
            } else {
                cast(&literal, column.data_type()).context(ArrowSnafu)?
            };
            (column.clone(), literal)
        }
    };

    let right = arrow::array::Scalar::new(literal);
    let mask = match op {
        ComparisonOp::Eq => cmp::eq(&left, &right),
        ComparisonOp::NotEq => cmp::neq(&left, &right),
        ComparisonOp::Lt => cmp::lt(&left, &right),
        ComparisonOp::LtEq => cmp::lt_eq(&left, &right),
        ComparisonOp::Gt => cmp::gt(&left, &right),
        ComparisonOp::GtEq => cmp::gt_eq(&left, &right),
    };
    mask.context(ArrowSnafu)
}

fn widen(column: &ArrayRef, to: &ArrowDataType) -> Result<ArrayRef, TableError> {
    if column.data_type() == to {
        Ok(column.clone())
    } else {
        cast(column, to).context(ArrowSnafu)
    }
}

fn literal_array(value: &Scalar) -> Result<ArrayRef, TableError> {
    let array: ArrayRef = match value {
        Scalar::Boolean(b) => Arc::new(BooleanArray::from(vec![*b])),
        Scalar::String(s) => Arc::new(StringArray::from(vec![s.as_str()])),
        Scalar::Date(d) => Arc::new(Date32Array::from(vec![*d])),
        Scalar::Timestamp(t) => Arc::new(TimestampMicrosecondArray::from(vec![*t])),
        Scalar::Long(v) => Arc::new(Int64Array::from(vec![*v])),
        Scalar::Double(v) => Arc::new(Float64Array::from(vec![*v])),
        Scalar::Null => {
            return InvalidPredicateSnafu {
                msg: "null literal has no array representation",
            }
            .fail()
        }
    };
    Ok(array)
}
