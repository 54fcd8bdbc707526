// src/quality/mod.rs

//! Declarative data-quality rules and the engine that evaluates them.
//!
//! Rules are plain configuration: they hold no state between runs and are
//! evaluated fresh against live warehouse data every time.
//!
//! - [`engine`] evaluates a [`QualityRules`] set against a gateway.

pub mod engine;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use engine::{check, QualitySummary};

/// Rule categories, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    RowCount,
    NotNull,
}

impl RuleCategory {
    pub const ORDER: [RuleCategory; 2] = [RuleCategory::RowCount, RuleCategory::NotNull];
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::RowCount => f.write_str("row_count"),
            RuleCategory::NotNull => f.write_str("not_null"),
        }
    }
}

/// Row count must fall within `[min, max]`; either bound may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowCountRule {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

/// No row may have a NULL in any of `columns`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotNullRule {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// One validation rule, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationRule {
    RowCount(RowCountRule),
    NotNull(NotNullRule),
}

impl ValidationRule {
    pub fn table(&self) -> Option<&str> {
        match self {
            ValidationRule::RowCount(r) => r.table.as_deref(),
            ValidationRule::NotNull(r) => r.table.as_deref(),
        }
    }
}

/// The full rule set of a quality-check task, grouped by category.
///
/// A category set to `None` is skipped with an informational log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityRules {
    #[serde(default)]
    pub row_count: Option<Vec<RowCountRule>>,
    #[serde(default)]
    pub not_null: Option<Vec<NotNullRule>>,
}

impl QualityRules {
    /// Rules of one category, or `None` when the category is not configured.
    pub fn category(&self, category: RuleCategory) -> Option<Vec<ValidationRule>> {
        match category {
            RuleCategory::RowCount => self
                .row_count
                .as_ref()
                .map(|list| list.iter().cloned().map(ValidationRule::RowCount).collect()),
            RuleCategory::NotNull => self
                .not_null
                .as_ref()
                .map(|list| list.iter().cloned().map(ValidationRule::NotNull).collect()),
        }
    }
}

/// A single rule violation found during a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    RowCountBelow { table: String, actual: i64, min: i64 },
    RowCountAbove { table: String, actual: i64, max: i64 },
    NullValues { table: String, columns: Vec<String>, count: i64 },
    /// The check query returned no rows at all (distinct from a zero count).
    MissingResult { category: RuleCategory, table: String },
}

impl Violation {
    pub fn table(&self) -> &str {
        match self {
            Violation::RowCountBelow { table, .. }
            | Violation::RowCountAbove { table, .. }
            | Violation::NullValues { table, .. }
            | Violation::MissingResult { table, .. } => table,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::RowCountBelow { table, actual, min } => write!(
                f,
                "row_count for table {table}: {actual} rows, expected at least {min}"
            ),
            Violation::RowCountAbove { table, actual, max } => write!(
                f,
                "row_count for table {table}: {actual} rows, expected at most {max}"
            ),
            Violation::NullValues { table, columns, count } => write!(
                f,
                "not_null for table {table}: {count} rows containing NULL in any of columns [{}]",
                columns.join(", ")
            ),
            Violation::MissingResult { category, table } => {
                write!(f, "{category} for table {table}: returned no results")
            }
        }
    }
}
