// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod operators;
pub mod quality;
pub mod report;
pub mod storage;
pub mod types;
pub mod warehouse;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_from_path, ConfigFile};
use crate::dag::{DagGraph, Scheduler};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, SystemClock};
use crate::errors::LoadgraphError;
use crate::exec::OperatorExecutor;
use crate::operators::OperatorContext;
use crate::report::RunReport;
use crate::storage::S3Locator;
use crate::types::RunContext;
use crate::warehouse::PostgresGateway;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (with CLI overrides)
/// - warehouse gateway and storage locator
/// - scheduler / core / runtime
/// - executor
/// - Ctrl-C handling
///
/// Returns `None` for `--dry-run`, otherwise the report of the finished run.
pub async fn run(args: CliArgs) -> Result<Option<RunReport>> {
    let cfg = load_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(None);
    }

    let logical_date = args
        .logical_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let run_ctx = RunContext::new(logical_date);

    let connstr = cfg.warehouse.connection_string().ok_or_else(|| {
        LoadgraphError::ConfigError(
            "no warehouse connection: set [warehouse].connection or connection_env".to_string(),
        )
    })?;
    let pool_size = cfg.warehouse.pool_size;

    // The sync driver must not connect from inside an async task.
    let gateway = tokio::task::spawn_blocking(move || PostgresGateway::connect(&connstr, pool_size))
        .await
        .context("warehouse connect task failed")?
        .map_err(LoadgraphError::from)?;
    info!("connected to warehouse");

    let locator = S3Locator::from_env().with_ttl(cfg.storage.credential_ttl);
    let ctx = OperatorContext::new(Arc::new(gateway), Arc::new(locator), run_ctx);

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = OperatorExecutor::new(ctx, rt_tx.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    info!(%run_ctx, tasks = cfg.task.len(), "starting run");

    let scheduler = Scheduler::from_config(&cfg);
    let core = CoreRuntime::new(scheduler, Arc::new(SystemClock));
    let runtime = Runtime::new(core, rt_rx, executor).with_deadline(cfg.config.deadline);
    let report = runtime.run().await?;

    println!("{report}");
    if let Some(path) = &args.report_json {
        let json = report.to_json().context("serializing run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing run report to {}", path.display()))?;
        debug!(path = %path.display(), "run report written");
    }

    Ok(Some(report))
}

/// Load the pipeline file and apply CLI overrides before validating.
pub fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut raw = load_from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Some(parallelism) = args.parallelism {
        raw.config.parallelism = parallelism;
    }
    if let Some(deadline) = args.deadline {
        raw.config.deadline = Some(deadline);
    }

    let cfg = ConfigFile::try_from(raw)?;
    Ok(cfg)
}

/// Dry-run output: tasks in execution order with kind, deps and retries.
fn print_dry_run(cfg: &ConfigFile) {
    let graph = DagGraph::from_config(cfg);

    println!("loadgraph dry-run");
    println!("  config.parallelism = {}", cfg.config.parallelism);
    if let Some(deadline) = cfg.config.deadline {
        println!("  config.deadline = {deadline:?}");
    }
    println!();

    let order = graph.topological_order().unwrap_or_default();
    println!("tasks ({}), in execution order:", order.len());
    for name in order {
        let Some(task) = cfg.task.get(name) else {
            continue;
        };
        print!("  - {name} [{}]", task.operator.kind());
        if let Some(table) = task.operator.target_table() {
            print!(" -> {table}");
        }
        println!();
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        let retry = cfg.retry_policy(name);
        if retry.max_retries > 0 {
            println!(
                "      retries: {} (delay {:?})",
                retry.max_retries, retry.delay
            );
        }
    }

    debug!("dry-run complete (no execution)");
}
