//! Filter expressions over top-level columns.
//!
//! A [`Predicate`] is a boolean tree of column-vs-literal comparisons and
//! null tests. The same tree is used in three places:
//! - the file index evaluates it against the typed partition values of a
//!   file (see [`Predicate::evaluate`]),
//! - data skipping evaluates it conservatively against file statistics,
//! - the scan evaluates the residual part against Arrow batches.
//!
//! Evaluation follows SQL three-valued logic everywhere: a comparison with a
//! null operand is unknown, and a row (or file) is kept only when the
//! predicate is known to be true.
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use snafu::prelude::*;

use crate::schema::{DataType, PrimitiveType, StructType};
use crate::table::error::{InvalidPredicateSnafu, TableError, UnknownColumnSnafu};

/// A literal value.
///
/// Dates are days since the Unix epoch, timestamps are microseconds since the
/// Unix epoch (UTC for `timestamp`, wall clock for `timestamp_ntz`).
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// SQL null.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Any integral value.
    Long(i64),
    /// Any floating point or decimal value.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Days since 1970-01-01.
    Date(i32),
    /// Microseconds since 1970-01-01T00:00:00.
    Timestamp(i64),
}

const EPOCH_DAYS_FROM_CE: i32 = 719_163;

impl Scalar {
    /// Whether this is [`Scalar::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Parse a string-encoded value (a partition value, a statistics value or
    /// a CLI literal) as `ty`.
    ///
    /// The empty string is the null value for every type but `string`, where
    /// the caller decides (partition values treat it as null).
    pub fn parse(raw: &str, ty: PrimitiveType) -> Result<Scalar, String> {
        let bad = |what: &str| format!("{raw:?} is not a valid {what}");
        let value = match ty {
            PrimitiveType::String | PrimitiveType::Binary => Scalar::String(raw.to_string()),
            _ if raw.is_empty() => Scalar::Null,
            PrimitiveType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" => Scalar::Boolean(true),
                "false" => Scalar::Boolean(false),
                _ => return Err(bad("boolean")),
            },
            PrimitiveType::Byte
            | PrimitiveType::Short
            | PrimitiveType::Integer
            | PrimitiveType::Long => Scalar::Long(raw.parse().map_err(|_| bad("integer"))?),
            PrimitiveType::Float | PrimitiveType::Double | PrimitiveType::Decimal { .. } => {
                Scalar::Double(raw.parse().map_err(|_| bad("number"))?)
            }
            PrimitiveType::Date => {
                let date =
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| bad("date"))?;
                Scalar::from(date)
            }
            PrimitiveType::Timestamp | PrimitiveType::TimestampNtz => {
                Scalar::Timestamp(parse_timestamp_micros(raw).ok_or_else(|| bad("timestamp"))?)
            }
        };
        Ok(value)
    }

    /// Convert this literal to the representation used for a column of type
    /// `ty`, or `None` when the two cannot be compared.
    ///
    /// Strings are parsed as the column type, so `date = '2024-01-01'` works.
    /// A floating point literal against an integral column stays a double;
    /// comparisons between longs and doubles are numeric.
    pub fn coerce_to(&self, ty: PrimitiveType) -> Option<Scalar> {
        use PrimitiveType as P;
        match (self, ty) {
            (Scalar::Null, _) => Some(Scalar::Null),
            (Scalar::Boolean(_), P::Boolean) => Some(self.clone()),
            (Scalar::Long(_), P::Byte | P::Short | P::Integer | P::Long) => Some(self.clone()),
            (Scalar::Long(v), P::Float | P::Double | P::Decimal { .. }) => {
                Some(Scalar::Double(*v as f64))
            }
            (Scalar::Double(_), t) if t.is_numeric() => Some(self.clone()),
            (Scalar::String(_), P::String | P::Binary) => Some(self.clone()),
            (Scalar::String(s), t) => Scalar::parse(s, t).ok().filter(|v| !v.is_null()),
            (Scalar::Date(_), P::Date) => Some(self.clone()),
            (Scalar::Date(d), P::Timestamp | P::TimestampNtz) => {
                Some(Scalar::Timestamp(*d as i64 * 86_400_000_000))
            }
            (Scalar::Timestamp(_), P::Timestamp | P::TimestampNtz) => Some(self.clone()),
            _ => None,
        }
    }

    /// Order two non-null values of compatible kinds.
    pub fn partial_cmp_value(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Boolean(a), Scalar::Boolean(b)) => Some(a.cmp(b)),
            (Scalar::Long(a), Scalar::Long(b)) => Some(a.cmp(b)),
            (Scalar::Double(a), Scalar::Double(b)) => a.partial_cmp(b),
            (Scalar::Long(a), Scalar::Double(b)) => cmp_long_double(*a, *b),
            (Scalar::Double(a), Scalar::Long(b)) => {
                cmp_long_double(*b, *a).map(Ordering::reverse)
            }
            (Scalar::String(a), Scalar::String(b)) => Some(a.cmp(b)),
            (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
            (Scalar::Timestamp(a), Scalar::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Order an `i64` against an `f64` without rounding the integer to the
/// nearest double.
fn cmp_long_double(a: i64, b: f64) -> Option<Ordering> {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if b.is_nan() {
        return None;
    }
    if b >= TWO_POW_63 {
        return Some(Ordering::Less);
    }
    if b < -TWO_POW_63 {
        return Some(Ordering::Greater);
    }
    // `floor` is an integer in [-2^63, 2^63) and converts exactly.
    let floor = b.floor();
    match a.cmp(&(floor as i64)) {
        Ordering::Equal if b > floor => Some(Ordering::Less),
        ord => Some(ord),
    }
}

fn parse_timestamp_micros(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_micros());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|ndt| ndt.and_utc().timestamp_micros())
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Boolean(b) => write!(f, "{b}"),
            Scalar::Long(v) => write!(f, "{v}"),
            Scalar::Double(v) => write!(f, "{v}"),
            Scalar::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Scalar::Date(days) => match NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE) {
                Some(d) => write!(f, "DATE '{d}'"),
                None => write!(f, "DATE {days}"),
            },
            Scalar::Timestamp(us) => match DateTime::<Utc>::from_timestamp_micros(*us) {
                Some(ts) => write!(f, "TIMESTAMP '{}'", ts.naive_utc()),
                None => write!(f, "TIMESTAMP {us}"),
            },
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Long(v as i64)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Long(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Double(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(d: NaiveDate) -> Self {
        Scalar::Date(d.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(ts: DateTime<Utc>) -> Self {
        Scalar::Timestamp(ts.timestamp_micros())
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl ComparisonOp {
    /// Apply to an ordering.
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            ComparisonOp::Eq => ord == Ordering::Equal,
            ComparisonOp::NotEq => ord != Ordering::Equal,
            ComparisonOp::Lt => ord == Ordering::Less,
            ComparisonOp::LtEq => ord != Ordering::Greater,
            ComparisonOp::Gt => ord == Ordering::Greater,
            ComparisonOp::GtEq => ord != Ordering::Less,
        }
    }

    /// The operator with its operands swapped (`a < b` is `b > a`).
    pub fn flip(self) -> ComparisonOp {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::LtEq => ComparisonOp::GtEq,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::GtEq => ComparisonOp::LtEq,
            other => other,
        }
    }

    /// SQL spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
        }
    }
}

/// A boolean filter over top-level columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op value`
    Comparison {
        /// Column name.
        column: String,
        /// Operator.
        op: ComparisonOp,
        /// Literal operand.
        value: Scalar,
    },
    /// `column IS NULL`
    IsNull(String),
    /// `column IS NOT NULL`
    IsNotNull(String),
    /// Both hold.
    And(Box<Predicate>, Box<Predicate>),
    /// Either holds.
    Or(Box<Predicate>, Box<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

/// Start a predicate on column `name`.
pub fn col(name: impl Into<String>) -> Column {
    Column(name.into())
}

/// A column reference; see [`col`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column(String);

impl Column {
    fn cmp(self, op: ComparisonOp, value: impl Into<Scalar>) -> Predicate {
        Predicate::Comparison {
            column: self.0,
            op,
            value: value.into(),
        }
    }

    /// `column = value`
    pub fn eq(self, value: impl Into<Scalar>) -> Predicate {
        self.cmp(ComparisonOp::Eq, value)
    }

    /// `column != value`
    pub fn ne(self, value: impl Into<Scalar>) -> Predicate {
        self.cmp(ComparisonOp::NotEq, value)
    }

    /// `column < value`
    pub fn lt(self, value: impl Into<Scalar>) -> Predicate {
        self.cmp(ComparisonOp::Lt, value)
    }

    /// `column <= value`
    pub fn lt_eq(self, value: impl Into<Scalar>) -> Predicate {
        self.cmp(ComparisonOp::LtEq, value)
    }

    /// `column > value`
    pub fn gt(self, value: impl Into<Scalar>) -> Predicate {
        self.cmp(ComparisonOp::Gt, value)
    }

    /// `column >= value`
    pub fn gt_eq(self, value: impl Into<Scalar>) -> Predicate {
        self.cmp(ComparisonOp::GtEq, value)
    }

    /// `column IS NULL`
    pub fn is_null(self) -> Predicate {
        Predicate::IsNull(self.0)
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(self) -> Predicate {
        Predicate::IsNotNull(self.0)
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

impl Predicate {
    /// `self AND other`
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// `self OR other`
    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// AND of all `predicates`, or `None` when empty.
    pub fn conjunction(predicates: impl IntoIterator<Item = Predicate>) -> Option<Predicate> {
        predicates.into_iter().reduce(Predicate::and)
    }

    /// Split a top-level AND chain into its operands.
    pub fn conjuncts(self) -> Vec<Predicate> {
        match self {
            Predicate::And(l, r) => {
                let mut out = l.conjuncts();
                out.extend(r.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// Names of all referenced columns.
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::Comparison { column, .. }
            | Predicate::IsNull(column)
            | Predicate::IsNotNull(column) => {
                out.insert(column);
            }
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            Predicate::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Resolve every column against `schema` and convert every literal to
    /// its column's type.
    ///
    /// Fails with `UnknownColumn` for a column not in `schema`, and with
    /// `InvalidPredicate` for a nested column or a literal that cannot be
    /// compared with the column.
    pub fn bind(&self, schema: &StructType) -> Result<Predicate, TableError> {
        let column_type = |column: &str| -> Result<PrimitiveType, TableError> {
            let field = schema
                .field(column)
                .context(UnknownColumnSnafu { column })?;
            match &field.data_type {
                DataType::Primitive(p) => Ok(*p),
                other => InvalidPredicateSnafu {
                    msg: format!("column {column} has non-primitive type {other}"),
                }
                .fail(),
            }
        };

        let bound = match self {
            Predicate::Comparison { column, op, value } => {
                let ty = column_type(column)?;
                let coerced = value.coerce_to(ty).with_context(|| InvalidPredicateSnafu {
                    msg: format!("cannot compare column {column} of type {ty} with {value}"),
                })?;
                Predicate::Comparison {
                    column: column.clone(),
                    op: *op,
                    value: coerced,
                }
            }
            Predicate::IsNull(column) => {
                column_type(column)?;
                self.clone()
            }
            Predicate::IsNotNull(column) => {
                column_type(column)?;
                self.clone()
            }
            Predicate::And(l, r) => l.bind(schema)?.and(r.bind(schema)?),
            Predicate::Or(l, r) => l.bind(schema)?.or(r.bind(schema)?),
            Predicate::Not(inner) => !inner.bind(schema)?,
        };
        Ok(bound)
    }

    /// Evaluate against one value per column with three-valued logic.
    ///
    /// `Some(true)`/`Some(false)` are definite answers; `None` is unknown
    /// (a null operand somewhere that decided the outcome). Columns that
    /// `value_of` does not know are treated as null.
    pub fn evaluate<'a>(&self, value_of: &dyn Fn(&str) -> Option<&'a Scalar>) -> Option<bool> {
        match self {
            Predicate::Comparison { column, op, value } => {
                let left = value_of(column).filter(|v| !v.is_null())?;
                if value.is_null() {
                    return None;
                }
                left.partial_cmp_value(value).map(|ord| op.holds(ord))
            }
            Predicate::IsNull(column) => Some(value_of(column).map_or(true, Scalar::is_null)),
            Predicate::IsNotNull(column) => Some(!value_of(column).map_or(true, Scalar::is_null)),
            Predicate::And(l, r) => match (l.evaluate(value_of), r.evaluate(value_of)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Predicate::Or(l, r) => match (l.evaluate(value_of), r.evaluate(value_of)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Predicate::Not(inner) => inner.evaluate(value_of).map(|b| !b),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Comparison { column, op, value } => {
                write!(f, "{column} {} {value}", op.symbol())
            }
            Predicate::IsNull(column) => write!(f, "{column} IS NULL"),
            Predicate::IsNotNull(column) => write!(f, "{column} IS NOT NULL"),
            Predicate::And(l, r) => write!(f, "({l} AND {r})"),
            Predicate::Or(l, r) => write!(f, "({l} OR {r})"),
            Predicate::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}
