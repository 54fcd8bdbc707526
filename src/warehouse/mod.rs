// src/warehouse/mod.rs

//! Warehouse gateway abstraction.
//!
//! Operators never talk to a database driver directly. They go through a
//! [`WarehouseGateway`], which is injected into every operator invocation.
//! Production uses [`PostgresGateway`]; tests use [`mock::MockWarehouse`].
//!
//! - [`postgres`] holds the `postgres`-crate backed implementation.
//! - [`mock`] is an in-memory warehouse for tests.

pub mod mock;
pub mod postgres;

use std::fmt;

use thiserror::Error;

pub use self::postgres::PostgresGateway;

/// Errors surfaced by a [`WarehouseGateway`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Warehouse unreachable or the connection dropped mid-statement.
    #[error("connection error: {0}")]
    Connection(String),

    /// Statement was rejected by the warehouse (syntax, missing table, ...).
    #[error("statement error: {0}")]
    Statement(String),
}

/// A single scalar returned by [`WarehouseGateway::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Interpret the value as an integer count.
    ///
    /// Text is parsed; floats are accepted only when they carry no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null | Value::Bool(_) | Value::Float(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
        }
    }
}

/// One result row, in column order.
pub type Row = Vec<Value>;

/// Executes SQL against a transactional relational store.
///
/// Implementations must be `Send + Sync`: a single gateway is shared by every
/// operator running concurrently within a run.
pub trait WarehouseGateway: Send + Sync {
    /// Run a statement (or a `;`-separated batch) that returns no rows.
    fn execute(&self, statement: &str) -> Result<(), GatewayError>;

    /// Run a query and return all rows in order.
    fn query(&self, statement: &str) -> Result<Vec<Row>, GatewayError>;
}

/// Wrap `statement` in `BEGIN; ...; COMMIT;` and execute it as one batch.
///
/// If any part of the batch fails the `COMMIT` is never reached, so nothing
/// from the batch becomes visible.
pub fn run_in_transaction(
    gateway: &dyn WarehouseGateway,
    statement: &str,
) -> Result<(), GatewayError> {
    gateway.execute(&transaction_batch(statement))
}

/// Render the transactional batch used by [`run_in_transaction`].
pub fn transaction_batch(statement: &str) -> String {
    let body = statement.trim().trim_end_matches(';');
    format!("BEGIN;\n{body};\nCOMMIT;")
}

/// Outcome of a `SELECT COUNT(*)` style query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountResult {
    /// The gateway returned no rows, or a first row without columns.
    Missing,
    Count(i64),
}

/// Run a counting query and extract the first column of the first row.
///
/// A first cell that is not an integer is reported as a statement error, since
/// the query itself is malformed for this purpose.
pub fn query_count(
    gateway: &dyn WarehouseGateway,
    statement: &str,
) -> Result<CountResult, GatewayError> {
    let rows = gateway.query(statement)?;
    let Some(cell) = rows.first().and_then(|row| row.first()) else {
        return Ok(CountResult::Missing);
    };

    cell.as_i64()
        .map(CountResult::Count)
        .ok_or_else(|| GatewayError::Statement(format!("expected an integer count, got {cell}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Vec<Row>);

    impl WarehouseGateway for Canned {
        fn execute(&self, _statement: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        fn query(&self, _statement: &str) -> Result<Vec<Row>, GatewayError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn transaction_batch_strips_trailing_semicolon() {
        let batch = transaction_batch("  TRUNCATE TABLE users; ");
        assert_eq!(batch, "BEGIN;\nTRUNCATE TABLE users;\nCOMMIT;");
    }

    #[test]
    fn query_count_distinguishes_missing_from_zero() {
        let empty = Canned(vec![]);
        assert_eq!(query_count(&empty, "q").unwrap(), CountResult::Missing);

        let no_columns = Canned(vec![vec![]]);
        assert_eq!(query_count(&no_columns, "q").unwrap(), CountResult::Missing);

        let zero = Canned(vec![vec![Value::Int(0)]]);
        assert_eq!(query_count(&zero, "q").unwrap(), CountResult::Count(0));
    }

    #[test]
    fn query_count_rejects_non_integer_cell() {
        let text = Canned(vec![vec![Value::Text("many".into())]]);
        assert!(matches!(
            query_count(&text, "q"),
            Err(GatewayError::Statement(_))
        ));
    }

    #[test]
    fn value_as_i64_accepts_numeric_text() {
        assert_eq!(Value::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }
}
