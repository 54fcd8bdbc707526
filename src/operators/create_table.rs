// src/operators/create_table.rs

use serde::Deserialize;
use tracing::info;

use super::OperatorError;
use crate::warehouse::{run_in_transaction, WarehouseGateway};

/// Ensure `table` exists using a caller-supplied DDL statement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTableSpec {
    pub table: String,
    /// Must use `CREATE TABLE IF NOT EXISTS` so re-runs leave data alone;
    /// enforced when the config is loaded.
    pub sql: String,
}

impl CreateTableSpec {
    /// Whether the DDL is safe to run against an already-provisioned warehouse.
    pub fn is_idempotent(&self) -> bool {
        let normalized = self
            .sql
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        normalized.contains("CREATE TABLE IF NOT EXISTS")
    }
}

pub fn run(spec: &CreateTableSpec, gateway: &dyn WarehouseGateway) -> Result<(), OperatorError> {
    info!(table = %spec.table, "creating table");
    run_in_transaction(gateway, &spec.sql)?;
    info!(table = %spec.table, "table ready");
    Ok(())
}
