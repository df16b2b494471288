//! Data skipping against per-file column statistics.
//!
//! [`may_match`] answers "could any row of this file satisfy the predicate?"
//! from the `minValues`/`maxValues`/`nullCount`/`numRecords` statistics of
//! an `add` action. It is conservative: whenever the statistics are missing
//! or not trustworthy for a column type it answers `true`.
//!
//! The predicate is first pushed into negation normal form. Under SQL
//! three-valued logic `NOT (x < 5)` keeps exactly the rows `x >= 5` keeps
//! (null rows are dropped by both), so the rewrite is exact and the leaves
//! can be checked one at a time.
use serde_json::Value;

use crate::expression::{ComparisonOp, Predicate, Scalar};
use crate::schema::{PrimitiveType, StructType};
use crate::transaction_log::FileStats;

/// Column types whose min/max statistics are compared.
///
/// `float` is left out since its statistics are printed at single precision
/// and compared at double precision; timestamps since writers truncate them
/// to milliseconds; strings since writers truncate long values.
fn is_skipping_eligible(ty: PrimitiveType) -> bool {
    matches!(
        ty,
        PrimitiveType::Byte
            | PrimitiveType::Short
            | PrimitiveType::Integer
            | PrimitiveType::Long
            | PrimitiveType::Double
            | PrimitiveType::Date
    )
}

/// Whether a file with `stats` may contain rows matching `predicate`.
///
/// `predicate` must already be bound to `schema` (see [`Predicate::bind`]).
pub fn may_match(predicate: &Predicate, stats: &FileStats, schema: &StructType) -> bool {
    may_match_nnf(&to_nnf(predicate.clone(), false), stats, schema)
}

fn to_nnf(predicate: Predicate, negate: bool) -> Predicate {
    match (predicate, negate) {
        (Predicate::Not(inner), n) => to_nnf(*inner, !n),
        (Predicate::And(l, r), false) => to_nnf(*l, false).and(to_nnf(*r, false)),
        (Predicate::Or(l, r), false) => to_nnf(*l, false).or(to_nnf(*r, false)),
        (Predicate::And(l, r), true) => to_nnf(*l, true).or(to_nnf(*r, true)),
        (Predicate::Or(l, r), true) => to_nnf(*l, true).and(to_nnf(*r, true)),
        (Predicate::IsNull(c), true) => Predicate::IsNotNull(c),
        (Predicate::IsNotNull(c), true) => Predicate::IsNull(c),
        (Predicate::Comparison { column, op, value }, true) => Predicate::Comparison {
            column,
            op: negate_op(op),
            value,
        },
        (leaf, false) => leaf,
    }
}

fn negate_op(op: ComparisonOp) -> ComparisonOp {
    match op {
        ComparisonOp::Eq => ComparisonOp::NotEq,
        ComparisonOp::NotEq => ComparisonOp::Eq,
        ComparisonOp::Lt => ComparisonOp::GtEq,
        ComparisonOp::LtEq => ComparisonOp::Gt,
        ComparisonOp::Gt => ComparisonOp::LtEq,
        ComparisonOp::GtEq => ComparisonOp::Lt,
    }
}

fn may_match_nnf(predicate: &Predicate, stats: &FileStats, schema: &StructType) -> bool {
    match predicate {
        Predicate::And(l, r) => may_match_nnf(l, stats, schema) && may_match_nnf(r, stats, schema),
        Predicate::Or(l, r) => may_match_nnf(l, stats, schema) || may_match_nnf(r, stats, schema),
        // Only reachable for predicates not in normal form.
        Predicate::Not(_) => true,
        Predicate::IsNull(column) => null_count(stats, column) != Some(0),
        Predicate::IsNotNull(column) => !all_null(stats, column),
        Predicate::Comparison { column, op, value } => {
            if value.is_null() || all_null(stats, column) {
                return false;
            }
            let Some(ty) = schema.field(column).and_then(|f| f.data_type.as_primitive()) else {
                return true;
            };
            if !is_skipping_eligible(ty) {
                return true;
            }
            let min = stat_value(&stats.min_values, column, ty);
            let max = stat_value(&stats.max_values, column, ty);
            compare_range(*op, min.as_ref(), max.as_ref(), value)
        }
    }
}

fn compare_range(op: ComparisonOp, min: Option<&Scalar>, max: Option<&Scalar>, value: &Scalar) -> bool {
    use std::cmp::Ordering::*;
    let cmp = |bound: Option<&Scalar>| bound.and_then(|b| b.partial_cmp_value(value));
    match op {
        ComparisonOp::Eq => cmp(min) != Some(Greater) && cmp(max) != Some(Less),
        ComparisonOp::NotEq => !(cmp(min) == Some(Equal) && cmp(max) == Some(Equal)),
        ComparisonOp::Lt => cmp(min) != Some(Greater) && cmp(min) != Some(Equal),
        ComparisonOp::LtEq => cmp(min) != Some(Greater),
        ComparisonOp::Gt => cmp(max) != Some(Less) && cmp(max) != Some(Equal),
        ComparisonOp::GtEq => cmp(max) != Some(Less),
    }
}

fn null_count(stats: &FileStats, column: &str) -> Option<i64> {
    stats.null_count.get(column).and_then(Value::as_i64)
}

fn all_null(stats: &FileStats, column: &str) -> bool {
    match (null_count(stats, column), stats.num_records) {
        (Some(nulls), Some(rows)) => rows > 0 && nulls >= rows,
        _ => false,
    }
}

fn stat_value(values: &serde_json::Map<String, Value>, column: &str, ty: PrimitiveType) -> Option<Scalar> {
    let value = values.get(column)?;
    match (value, ty) {
        (Value::Number(n), PrimitiveType::Double) => n.as_f64().map(Scalar::Double),
        (Value::Number(n), _) if ty.integer_rank().is_some() => n.as_i64().map(Scalar::Long),
        (Value::String(s), PrimitiveType::Date) => Scalar::parse(s, ty).ok(),
        _ => None,
    }
}
