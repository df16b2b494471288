//! Parsing of `--where` clauses.
//!
//! A clause is `<column> <op> <literal>` with `op` one of `= == != <> < <= >
//! >=`, or `<column> IS [NOT] NULL`. Several clauses are ANDed together.
//! Literals are typed loosely here; binding against the table schema turns
//! `'2024-01-01'` into a date for a date column and so on.

use delta_table_core::{col, ComparisonOp, Predicate, Scalar};

use crate::error::{CliError, CliResult};

const OPERATORS: &[(&str, ComparisonOp)] = &[
    ("<=", ComparisonOp::LtEq),
    (">=", ComparisonOp::GtEq),
    ("!=", ComparisonOp::NotEq),
    ("<>", ComparisonOp::NotEq),
    ("==", ComparisonOp::Eq),
    ("=", ComparisonOp::Eq),
    ("<", ComparisonOp::Lt),
    (">", ComparisonOp::Gt),
];

fn invalid(expr: &str, msg: impl Into<String>) -> CliError {
    CliError::InvalidFilter {
        expr: expr.to_string(),
        msg: msg.into(),
    }
}

/// AND of all clauses, or `None` when there are none.
pub fn parse_filters(clauses: &[String]) -> CliResult<Option<Predicate>> {
    let parsed = clauses
        .iter()
        .map(|c| parse_clause(c))
        .collect::<CliResult<Vec<_>>>()?;
    Ok(Predicate::conjunction(parsed))
}

pub fn parse_clause(expr: &str) -> CliResult<Predicate> {
    let trimmed = expr.trim();
    let upper = trimmed.to_ascii_uppercase();

    for (suffix, negated) in [(" IS NOT NULL", true), (" IS NULL", false)] {
        if upper.ends_with(suffix) {
            let column = column_name(expr, &trimmed[..trimmed.len() - suffix.len()])?;
            return Ok(if negated {
                col(column).is_not_null()
            } else {
                col(column).is_null()
            });
        }
    }

    let pos = trimmed
        .find(['<', '>', '=', '!'])
        .ok_or_else(|| invalid(expr, "expected a comparison operator or IS [NOT] NULL"))?;
    let rest = &trimmed[pos..];
    let (symbol, op) = OPERATORS
        .iter()
        .find(|(symbol, _)| rest.starts_with(symbol))
        .ok_or_else(|| invalid(expr, "unknown operator"))?;

    let column = column_name(expr, &trimmed[..pos])?;
    let literal = parse_literal(expr, rest[symbol.len()..].trim())?;
    Ok(Predicate::Comparison {
        column,
        op: *op,
        value: literal,
    })
}

fn column_name(expr: &str, raw: &str) -> CliResult<String> {
    let name = raw.trim();
    let name = name
        .strip_prefix('`')
        .and_then(|n| n.strip_suffix('`'))
        .unwrap_or(name);
    if name.is_empty() {
        return Err(invalid(expr, "missing column name"));
    }
    Ok(name.to_string())
}

fn parse_literal(expr: &str, raw: &str) -> CliResult<Scalar> {
    if raw.is_empty() {
        return Err(invalid(expr, "missing literal"));
    }

    for quote in ['\'', '"'] {
        if let Some(inner) = raw.strip_prefix(quote) {
            let inner = inner
                .strip_suffix(quote)
                .ok_or_else(|| invalid(expr, "unterminated string literal"))?;
            let doubled = format!("{quote}{quote}");
            return Ok(Scalar::String(inner.replace(&doubled, &quote.to_string())));
        }
    }

    if raw.eq_ignore_ascii_case("null") {
        return Ok(Scalar::Null);
    }
    if raw.eq_ignore_ascii_case("true") {
        return Ok(Scalar::Boolean(true));
    }
    if raw.eq_ignore_ascii_case("false") {
        return Ok(Scalar::Boolean(false));
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(Scalar::Long(v));
    }
    if let Ok(v) = raw.parse::<f64>() {
        return Ok(Scalar::Double(v));
    }
    Ok(Scalar::String(raw.to_string()))
}
