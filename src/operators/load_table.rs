// src/operators/load_table.rs

//! Transform-and-insert into dimension and fact tables.
//!
//! Both kinds share [`LoadSpec`] and run the same code. The only behavioural
//! switch is `truncate`, which has no default: dimensions are normally
//! rebuilt (`truncate = true`) and facts appended (`truncate = false`), but
//! the config says so explicitly.

use serde::Deserialize;
use tracing::info;

use super::stage::truncate_sql;
use super::{OperatorError, OperatorKind};
use crate::warehouse::{run_in_transaction, WarehouseGateway};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadSpec {
    pub target_table: String,
    pub target_columns: Vec<String>,
    /// A `SELECT` reading from staging tables, projected in
    /// `target_columns` order.
    pub transform_sql: String,
    pub truncate: bool,
}

impl LoadSpec {
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({})\n{}",
            self.target_table,
            self.target_columns.join(", "),
            self.transform_sql.trim().trim_end_matches(';')
        )
    }
}

/// Retries re-run the whole operator: truncate (if enabled) then insert.
pub fn run(
    spec: &LoadSpec,
    kind: OperatorKind,
    gateway: &dyn WarehouseGateway,
) -> Result<(), OperatorError> {
    let table = spec.target_table.as_str();

    if spec.truncate {
        info!(table, %kind, "truncating table");
        run_in_transaction(gateway, &truncate_sql(table))?;
    }

    info!(table, %kind, "loading table");
    run_in_transaction(gateway, &spec.insert_sql())?;
    info!(table, %kind, "load succeeded");
    Ok(())
}
