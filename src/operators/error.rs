// src/operators/error.rs

use thiserror::Error;

use crate::quality::Violation;
use crate::storage::StorageError;
use crate::warehouse::GatewayError;

/// Why a single operator invocation failed.
///
/// Every variant ends up as a `Failed` task; [`OperatorError::is_retryable`]
/// decides whether the scheduler may try again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The post-load count query returned no rows at all.
    #[error("staging table {table} failed: count query returned no results")]
    NoResult { table: String },

    /// The load committed but the table holds no rows.
    #[error("staging table {table} failed: number of records is {count}")]
    EmptyLoad { table: String, count: i64 },

    #[error("data quality check failed with {} violation(s): {}", .0.len(), join_violations(.0))]
    Validation(Vec<Violation>),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("operator panicked: {0}")]
    Panicked(String),

    /// The run was cancelled; an in-flight operator finished but its result
    /// is discarded.
    #[error("run cancelled: {0}")]
    Cancelled(String),
}

impl OperatorError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Statement errors are retried too: warehouse contention surfaces as a
    /// statement error often enough. Rule violations and configuration
    /// problems reproduce on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            OperatorError::Gateway(_) => true,
            OperatorError::Storage(err) => matches!(
                err,
                StorageError::Unreachable(_) | StorageError::CredentialsExpired { .. }
            ),
            OperatorError::NoResult { .. } | OperatorError::EmptyLoad { .. } => true,
            OperatorError::Validation(_)
            | OperatorError::Configuration(_)
            | OperatorError::Panicked(_)
            | OperatorError::Cancelled(_) => false,
        }
    }

    /// Violations carried by a failed quality check, if any.
    pub fn violations(&self) -> &[Violation] {
        match self {
            OperatorError::Validation(v) => v,
            _ => &[],
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(OperatorError::Gateway(GatewayError::Statement("x".into())).is_retryable());
        assert!(OperatorError::Gateway(GatewayError::Connection("x".into())).is_retryable());
        assert!(OperatorError::EmptyLoad { table: "t".into(), count: 0 }.is_retryable());
        assert!(!OperatorError::Configuration("x".into()).is_retryable());
        assert!(!OperatorError::Validation(vec![]).is_retryable());
        assert!(
            !OperatorError::Storage(StorageError::MissingCredentials("aws".into())).is_retryable()
        );
    }

    #[test]
    fn validation_message_lists_every_violation() {
        let err = OperatorError::Validation(vec![
            Violation::RowCountBelow { table: "users".into(), actual: 0, min: 1 },
            Violation::RowCountBelow { table: "songs".into(), actual: 0, min: 1 },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 violation(s)"), "got: {msg}");
        assert!(msg.contains("users"));
        assert!(msg.contains("songs"));
    }
}
