// tests/operator_failures.rs

//! Failure paths of real operators behind the real executor: expired
//! credentials are retried, a panicking operator is not.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use loadgraph::config::ConfigFile;
use loadgraph::dag::{Scheduler, TaskState};
use loadgraph::engine::{CoreRuntime, Runtime, RuntimeEvent, SystemClock};
use loadgraph::exec::OperatorExecutor;
use loadgraph::operators::OperatorContext;
use loadgraph::quality::{QualityRules, RowCountRule};
use loadgraph::report::{RunReport, RunStatus};
use loadgraph::types::RunContext;
use loadgraph::warehouse::{GatewayError, Row, WarehouseGateway};
use loadgraph_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use loadgraph_test_utils::locator::StaticLocator;
use loadgraph_test_utils::{init_tracing, with_timeout, MockWarehouse};

type TestResult = Result<(), Box<dyn Error>>;

/// begin -> {create_staging, create_facts} -> stage -> load -> check -> end
fn pipeline(retries: u32) -> loadgraph::errors::Result<ConfigFile> {
    let rules = QualityRules {
        row_count: Some(vec![RowCountRule {
            table: Some("facts".into()),
            min: Some(1),
            max: None,
        }]),
        not_null: None,
    };

    ConfigFileBuilder::new()
        .with_default_retries(retries, Duration::from_millis(10))
        .with_task("begin", TaskConfigBuilder::barrier().build())
        .with_task(
            "create_staging",
            TaskConfigBuilder::create_table("staging").after("begin").build(),
        )
        .with_task(
            "create_facts",
            TaskConfigBuilder::create_table("facts").after("begin").build(),
        )
        .with_task(
            "stage",
            TaskConfigBuilder::stage("staging", "events-bucket", "events/{year}/{month}")
                .after("create_staging")
                .after("create_facts")
                .build(),
        )
        .with_task(
            "load",
            TaskConfigBuilder::load_fact("facts", &["id"], "SELECT id FROM staging", false)
                .after("stage")
                .build(),
        )
        .with_task(
            "check",
            TaskConfigBuilder::quality_check(rules).after("load").build(),
        )
        .with_task("end", TaskConfigBuilder::barrier().after("check").build())
        .try_build()
}

fn stocked_warehouse() -> MockWarehouse {
    let wh = MockWarehouse::new();
    wh.set_copy_rows("staging", 40);
    wh.set_insert_rows("facts", 25);
    wh
}

async fn run(
    cfg: &ConfigFile,
    gateway: Arc<dyn WarehouseGateway>,
    locator: StaticLocator,
) -> Result<RunReport, Box<dyn Error>> {
    let run = RunContext::for_month(2018, 11).ok_or("bad date")?;
    let ctx = OperatorContext::new(gateway, Arc::new(locator), run);

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = OperatorExecutor::new(ctx, rt_tx);
    let core = CoreRuntime::new(Scheduler::from_config(cfg), Arc::new(SystemClock));
    let runtime = Runtime::new(core, rt_rx, executor);

    Ok(with_timeout(runtime.run()).await?)
}

/// Delegates to a [`MockWarehouse`] but panics on statements containing
/// `trigger`, the way a driver bug would.
struct PanickingWarehouse {
    inner: MockWarehouse,
    trigger: &'static str,
}

impl WarehouseGateway for PanickingWarehouse {
    fn execute(&self, statement: &str) -> Result<(), GatewayError> {
        if statement.contains(self.trigger) {
            panic!("driver crashed on {}", self.trigger);
        }
        self.inner.execute(statement)
    }

    fn query(&self, statement: &str) -> Result<Vec<Row>, GatewayError> {
        self.inner.query(statement)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn small_pipeline_succeeds() -> TestResult {
    init_tracing();

    let cfg = pipeline(0)?;
    let wh = stocked_warehouse();
    let locator = StaticLocator::new().with_credentials("aws", "AKIAEXAMPLE", "s3cr3t");

    let report = run(&cfg, Arc::new(wh.clone()), locator).await?;

    assert_eq!(report.status, RunStatus::Succeeded, "{report}");
    assert_eq!(wh.row_count("facts"), Some(25));
    assert!(wh
        .executed()
        .iter()
        .any(|sql| sql.contains("FROM 's3://events-bucket/events/2018/11'")));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_credentials_are_retried_then_fail() -> TestResult {
    init_tracing();

    let cfg = pipeline(1)?;
    let wh = stocked_warehouse();
    let expired = Utc::now() - chrono::Duration::minutes(5);
    let locator = StaticLocator::new().with_expiry("aws", "AKIAEXAMPLE", "s3cr3t", expired);

    let report = run(&cfg, Arc::new(wh.clone()), locator).await?;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.task, "stage");
    assert_eq!(failure.attempts, 2);
    assert!(failure.error.contains("credentials for 'aws' expired"), "{}", failure.error);

    for task in ["load", "check", "end"] {
        assert_eq!(report.tasks[task].state, TaskState::Skipped, "{task}");
    }
    // Expiry is checked before anything touches the staging table.
    assert!(!wh.executed().iter().any(|sql| sql.contains("COPY")));
    assert_eq!(wh.row_count("staging"), Some(0));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_operator_fails_without_retry() -> TestResult {
    init_tracing();

    let cfg = pipeline(2)?;
    let wh = stocked_warehouse();
    let gateway = PanickingWarehouse {
        inner: wh.clone(),
        trigger: "INSERT INTO facts",
    };
    let locator = StaticLocator::new().with_credentials("aws", "AKIAEXAMPLE", "s3cr3t");

    let report = run(&cfg, Arc::new(gateway), locator).await?;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.tasks["stage"].state, TaskState::Succeeded);

    let load = &report.tasks["load"];
    assert_eq!(load.state, TaskState::Failed);
    assert_eq!(load.attempts, 1);
    assert!(load.error.as_deref().is_some_and(|e| e.contains("panicked")));

    assert_eq!(report.skipped, vec!["check", "end"]);
    assert_eq!(wh.row_count("facts"), Some(0));

    Ok(())
}
