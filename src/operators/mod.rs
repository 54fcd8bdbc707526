// src/operators/mod.rs

//! The operator set: one closed enum, one function per kind.
//!
//! Every operator is a small state machine over one or more warehouse
//! transactions and must be safe to run again after a failure (idempotent
//! creates, truncate-before-load, or append-only facts).
//!
//! - [`create_table`] provisions a table with `CREATE TABLE IF NOT EXISTS`.
//! - [`stage`] bulk-loads external data from object storage.
//! - [`load_table`] fills dimension and fact tables from a transform query.
//! - Quality checks delegate to [`crate::quality`].

pub mod create_table;
pub mod error;
pub mod load_table;
pub mod stage;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::quality::QualityRules;
use crate::storage::ObjectStorageLocator;
use crate::types::RunContext;
use crate::warehouse::WarehouseGateway;

pub use create_table::CreateTableSpec;
pub use error::OperatorError;
pub use load_table::LoadSpec;
pub use stage::{DataFormat, StagingSpec};

/// Operator kind without its configuration payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Barrier,
    CreateTable,
    Stage,
    LoadFact,
    LoadDimension,
    QualityCheck,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperatorKind::Barrier => "barrier",
            OperatorKind::CreateTable => "create_table",
            OperatorKind::Stage => "stage",
            OperatorKind::LoadFact => "load_fact",
            OperatorKind::LoadDimension => "load_dimension",
            OperatorKind::QualityCheck => "quality_check",
        };
        f.write_str(s)
    }
}

/// A task's unit of work together with its configuration.
///
/// Deserialized from the `kind = "..."` field of a `[task.<name>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operator {
    /// Join point with no warehouse work; never dispatched.
    Barrier,
    CreateTable(CreateTableSpec),
    Stage(StagingSpec),
    LoadFact(LoadSpec),
    LoadDimension(LoadSpec),
    QualityCheck(QualityRules),
}

impl Operator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Barrier => OperatorKind::Barrier,
            Operator::CreateTable(_) => OperatorKind::CreateTable,
            Operator::Stage(_) => OperatorKind::Stage,
            Operator::LoadFact(_) => OperatorKind::LoadFact,
            Operator::LoadDimension(_) => OperatorKind::LoadDimension,
            Operator::QualityCheck(_) => OperatorKind::QualityCheck,
        }
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self, Operator::Barrier)
    }

    /// Table this operator writes to, if it writes to exactly one.
    pub fn target_table(&self) -> Option<&str> {
        match self {
            Operator::CreateTable(spec) => Some(&spec.table),
            Operator::Stage(spec) => Some(&spec.target_table),
            Operator::LoadFact(spec) | Operator::LoadDimension(spec) => Some(&spec.target_table),
            Operator::Barrier | Operator::QualityCheck(_) => None,
        }
    }
}

/// Shared, read-only dependencies handed to every operator invocation.
#[derive(Clone)]
pub struct OperatorContext {
    pub gateway: Arc<dyn WarehouseGateway>,
    pub locator: Arc<dyn ObjectStorageLocator>,
    pub run: RunContext,
}

impl fmt::Debug for OperatorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorContext")
            .field("run", &self.run)
            .finish_non_exhaustive()
    }
}

impl OperatorContext {
    pub fn new(
        gateway: Arc<dyn WarehouseGateway>,
        locator: Arc<dyn ObjectStorageLocator>,
        run: RunContext,
    ) -> Self {
        Self {
            gateway,
            locator,
            run,
        }
    }
}

/// Run `operator` to completion. Blocking: call from a blocking thread.
pub fn execute(operator: &Operator, ctx: &OperatorContext) -> Result<(), OperatorError> {
    let gateway = ctx.gateway.as_ref();

    match operator {
        Operator::Barrier => {
            debug!("barrier has no work");
            Ok(())
        }
        Operator::CreateTable(spec) => create_table::run(spec, gateway),
        Operator::Stage(spec) => {
            let rows = stage::run(spec, gateway, ctx.locator.as_ref(), &ctx.run)?;
            info!(table = %spec.target_table, rows, "staging finished");
            Ok(())
        }
        Operator::LoadFact(spec) => load_table::run(spec, OperatorKind::LoadFact, gateway),
        Operator::LoadDimension(spec) => {
            load_table::run(spec, OperatorKind::LoadDimension, gateway)
        }
        Operator::QualityCheck(rules) => crate::quality::check(rules, gateway).map(|_| ()),
    }
}
