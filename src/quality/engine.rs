// src/quality/engine.rs

//! Rule evaluation.
//!
//! Categories run in a fixed order (row counts, then not-null). Inside a
//! category every rule is evaluated, even after a violation or a gateway
//! error, so one failed run reports everything wrong in that category. The
//! first category with any violation stops the check. A gateway error only
//! surfaces when its category found no violations.

use tracing::{debug, info, warn};

use super::{NotNullRule, QualityRules, RowCountRule, RuleCategory, ValidationRule, Violation};
use crate::operators::OperatorError;
use crate::warehouse::{query_count, CountResult, GatewayError, WarehouseGateway};

/// Counts of what a passing check looked at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualitySummary {
    pub checked: usize,
    pub skipped: usize,
}

/// Evaluate `rules` against the live warehouse.
///
/// Returns `Err(OperatorError::Validation(..))` with every violation of the
/// first failing category, `Err(OperatorError::Configuration(..))` for a
/// row-count rule without a table, and the first gateway error of a category
/// that otherwise passed.
pub fn check(
    rules: &QualityRules,
    gateway: &dyn WarehouseGateway,
) -> Result<QualitySummary, OperatorError> {
    info!("performing data quality checks");
    let mut summary = QualitySummary::default();

    for category in RuleCategory::ORDER {
        let Some(batch) = rules.category(category) else {
            info!(%category, "no rules configured; skipping category");
            continue;
        };
        check_category(category, &batch, gateway, &mut summary)?;
    }

    info!(
        checked = summary.checked,
        skipped = summary.skipped,
        "passed all data quality checks"
    );
    Ok(summary)
}

fn check_category(
    category: RuleCategory,
    rules: &[ValidationRule],
    gateway: &dyn WarehouseGateway,
    summary: &mut QualitySummary,
) -> Result<(), OperatorError> {
    let mut violations = Vec::new();
    let mut gateway_error: Option<GatewayError> = None;

    for rule in rules {
        match evaluate(rule, gateway, summary) {
            Ok(found) => violations.extend(found),
            Err(OperatorError::Gateway(err)) => {
                warn!(%category, table = rule.table(), error = %err, "quality query failed");
                gateway_error.get_or_insert(err);
            }
            Err(other) => return Err(other),
        }
    }

    if !violations.is_empty() {
        for v in &violations {
            warn!(%category, table = v.table(), "data quality violation: {v}");
        }
        if gateway_error.is_some() {
            warn!(%category, "category stopped short of a full pass; reporting violations found");
        }
        return Err(OperatorError::Validation(violations));
    }

    match gateway_error {
        Some(err) => Err(OperatorError::Gateway(err)),
        None => Ok(()),
    }
}

fn evaluate(
    rule: &ValidationRule,
    gateway: &dyn WarehouseGateway,
    summary: &mut QualitySummary,
) -> Result<Vec<Violation>, OperatorError> {
    match rule {
        ValidationRule::RowCount(r) => check_row_count(r, gateway, summary),
        ValidationRule::NotNull(r) => check_not_null(r, gateway, summary),
    }
}

fn check_row_count(
    rule: &RowCountRule,
    gateway: &dyn WarehouseGateway,
    summary: &mut QualitySummary,
) -> Result<Vec<Violation>, OperatorError> {
    let table = rule.table.as_deref().filter(|t| !t.is_empty()).ok_or_else(|| {
        OperatorError::Configuration("row_count rule is missing a table name".to_string())
    })?;

    summary.checked += 1;
    let count = match query_count(gateway, &row_count_sql(table))? {
        CountResult::Missing => {
            return Ok(vec![Violation::MissingResult {
                category: RuleCategory::RowCount,
                table: table.to_string(),
            }]);
        }
        CountResult::Count(n) => n,
    };

    let mut violations = Vec::new();
    if let Some(min) = rule.min {
        if count < min {
            violations.push(Violation::RowCountBelow {
                table: table.to_string(),
                actual: count,
                min,
            });
        }
    }
    if let Some(max) = rule.max {
        if count > max {
            violations.push(Violation::RowCountAbove {
                table: table.to_string(),
                actual: count,
                max,
            });
        }
    }

    if violations.is_empty() {
        info!(table, rows = count, "row_count check passed");
    }
    Ok(violations)
}

fn check_not_null(
    rule: &NotNullRule,
    gateway: &dyn WarehouseGateway,
    summary: &mut QualitySummary,
) -> Result<Vec<Violation>, OperatorError> {
    let Some(sql) = not_null_sql(rule) else {
        debug!(?rule, "not_null rule has no table or columns; nothing to check");
        summary.skipped += 1;
        return Ok(Vec::new());
    };
    let table = rule.table.as_deref().unwrap_or_default();
    summary.checked += 1;

    let violation = match query_count(gateway, &sql)? {
        CountResult::Missing => Violation::MissingResult {
            category: RuleCategory::NotNull,
            table: table.to_string(),
        },
        CountResult::Count(0) => {
            info!(table, columns = ?rule.columns, "not_null check passed");
            return Ok(Vec::new());
        }
        CountResult::Count(count) => Violation::NullValues {
            table: table.to_string(),
            columns: rule.columns.clone(),
            count,
        },
    };
    Ok(vec![violation])
}

/// `SELECT COUNT(*) FROM <table>`.
pub fn row_count_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {table}")
}

/// One disjunctive query per table: a row counts if any listed column is NULL.
///
/// Returns `None` when the rule has no table or no columns.
pub fn not_null_sql(rule: &NotNullRule) -> Option<String> {
    let table = rule.table.as_deref().filter(|t| !t.is_empty())?;
    if rule.columns.is_empty() {
        return None;
    }
    let predicate = rule
        .columns
        .iter()
        .map(|c| format!("{c} IS NULL"))
        .collect::<Vec<_>>()
        .join(" OR ");
    Some(format!("SELECT COUNT(*) FROM {table} WHERE {predicate}"))
}
