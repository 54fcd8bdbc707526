// src/operators/stage.rs

//! Bulk staging from object storage into a landing table.
//!
//! Steps, each a separate gateway call:
//!
//! 1. resolve the source URI for this run,
//! 2. fetch credentials and reject expired ones,
//! 3. truncate the target (own transaction, only when requested),
//! 4. `COPY` inside a transaction,
//! 5. count rows in the target; an empty table fails the task even though
//!    the `COPY` committed.
//!
//! The truncate and the load are deliberately not merged into one
//! transaction: a failure between them leaves the table empty and the task
//! Failed, so the next attempt re-populates it.

use std::fmt;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use super::OperatorError;
use crate::storage::{Credentials, ObjectStorageLocator, SourceTemplate, StorageError};
use crate::types::RunContext;
use crate::warehouse::{query_count, run_in_transaction, CountResult, WarehouseGateway};

/// Source file format understood by `COPY`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Json,
    Csv,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Json => f.write_str("JSON"),
            DataFormat::Csv => f.write_str("CSV"),
        }
    }
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_truncate() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagingSpec {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub render_key: bool,
    #[serde(default)]
    pub format: DataFormat,
    /// JSON: `auto` or a JSONPaths file URI. CSV: the field delimiter.
    #[serde(default)]
    pub format_mode: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    pub target_table: String,
    pub credentials_id: String,
    #[serde(default = "default_truncate")]
    pub truncate: bool,
}

impl StagingSpec {
    pub fn source(&self) -> SourceTemplate {
        SourceTemplate {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            render_key: self.render_key,
        }
    }
}

/// Stage one source into `spec.target_table`. Returns the post-load row count.
pub fn run(
    spec: &StagingSpec,
    gateway: &dyn WarehouseGateway,
    locator: &dyn ObjectStorageLocator,
    run: &RunContext,
) -> Result<i64, OperatorError> {
    let table = spec.target_table.as_str();

    let uri = locator.resolve(&spec.source(), run)?;
    debug!(table, %uri, "resolved staging source");

    let credentials = locator.credentials(&spec.credentials_id)?;
    let now = Utc::now();
    if credentials.is_expired_at(now) {
        return Err(StorageError::CredentialsExpired {
            id: spec.credentials_id.clone(),
            expired_at: credentials.expiry,
        }
        .into());
    }

    if spec.truncate {
        info!(table, "truncating staging table");
        run_in_transaction(gateway, &truncate_sql(table))?;
    }

    info!(table, %uri, format = %spec.format, "copying from object storage");
    run_in_transaction(gateway, &copy_sql(spec, &uri, &credentials))?;

    match query_count(gateway, &format!("SELECT COUNT(*) FROM {table}"))? {
        CountResult::Missing => Err(OperatorError::NoResult {
            table: table.to_string(),
        }),
        CountResult::Count(count) if count < 1 => Err(OperatorError::EmptyLoad {
            table: table.to_string(),
            count,
        }),
        CountResult::Count(count) => Ok(count),
    }
}

pub(crate) fn truncate_sql(table: &str) -> String {
    format!("TRUNCATE TABLE {table}")
}

/// Render the `COPY` statement. Contains secrets: never log the result.
fn copy_sql(spec: &StagingSpec, uri: &str, credentials: &Credentials) -> String {
    let mut sql = format!(
        "COPY {table}\nFROM '{uri}'\nACCESS_KEY_ID '{access}'\nSECRET_ACCESS_KEY '{secret}'",
        table = spec.target_table,
        access = credentials.access_key.expose(),
        secret = credentials.secret_key.expose(),
    );
    if let Some(token) = &credentials.session_token {
        sql.push_str(&format!("\nSESSION_TOKEN '{}'", token.expose()));
    }
    sql.push_str(&format!("\nREGION '{}'", spec.region));

    match spec.format {
        DataFormat::Json => {
            let mode = spec.format_mode.as_deref().unwrap_or("auto");
            sql.push_str(&format!("\nFORMAT AS JSON '{mode}'"));
        }
        DataFormat::Csv => {
            sql.push_str("\nFORMAT AS CSV");
            if let Some(delimiter) = &spec.format_mode {
                sql.push_str(&format!("\nDELIMITER '{delimiter}'"));
            }
        }
    }

    sql.push_str("\nBLANKSASNULL\nEMPTYASNULL\nTRUNCATECOLUMNS");
    sql
}
