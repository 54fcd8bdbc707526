// tests/runtime_fake_executor.rs

use loadgraph_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use loadgraph_test_utils::fake_executor::{dispatched_names, Dispatch, FakeExecutor};
use loadgraph_test_utils::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use loadgraph::config::ConfigFile;
use loadgraph::dag::{Scheduler, TaskState};
use loadgraph::engine::{CoreRuntime, Runtime, RuntimeEvent, SystemClock, TaskOutcome};
use loadgraph::operators::OperatorError;
use loadgraph::report::RunStatus;
use loadgraph::warehouse::GatewayError;

type TestResult = Result<(), Box<dyn Error>>;

/// begin -> create_a -> end
fn simple_chain_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_task("begin", TaskConfigBuilder::barrier().build())
        .with_task(
            "create_a",
            TaskConfigBuilder::create_table("a").after("begin").build(),
        )
        .with_task("end", TaskConfigBuilder::barrier().after("create_a").build())
        .build()
}

/// begin -> {create_a, create_b, create_c} -> sync -> end
fn fan_out_config(parallelism: usize) -> ConfigFile {
    let mut builder = ConfigFileBuilder::new()
        .with_parallelism(parallelism)
        .with_task("begin", TaskConfigBuilder::barrier().build());
    for table in ["a", "b", "c"] {
        builder = builder.with_task(
            &format!("create_{table}"),
            TaskConfigBuilder::create_table(table).after("begin").build(),
        );
    }
    builder
        .with_task(
            "sync",
            TaskConfigBuilder::barrier()
                .after("create_a")
                .after("create_b")
                .after("create_c")
                .build(),
        )
        .with_task("end", TaskConfigBuilder::barrier().after("sync").build())
        .build()
}

fn statement_error(msg: &str) -> TaskOutcome {
    TaskOutcome::Failed(OperatorError::Gateway(GatewayError::Statement(msg.into())))
}

fn runtime(cfg: &ConfigFile, executor: FakeExecutor, rt_rx: mpsc::Receiver<RuntimeEvent>) -> Runtime<FakeExecutor> {
    let core = CoreRuntime::new(Scheduler::from_config(cfg), Arc::new(SystemClock));
    Runtime::new(core, rt_rx, executor).with_deadline(cfg.config.deadline)
}

#[tokio::test]
async fn runtime_with_fake_executor_runs_simple_chain() -> TestResult {
    init_tracing();

    let cfg = simple_chain_config();
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executor = FakeExecutor::new(rt_tx.clone());
    let log = executor.dispatched();

    let report = with_timeout(runtime(&cfg, executor, rt_rx).run()).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(dispatched_names(&log), vec!["create_a".to_string()]);
    assert_eq!(report.tasks["begin"].state, TaskState::Succeeded);
    assert_eq!(report.tasks["end"].state, TaskState::Succeeded);
    assert_eq!(report.tasks["create_a"].attempts, 1);

    Ok(())
}

#[tokio::test]
async fn parallelism_one_serializes_fan_out() -> TestResult {
    init_tracing();

    let cfg = fan_out_config(1);
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executor = FakeExecutor::new(rt_tx.clone())
        .delay("create_a", Duration::from_millis(20))
        .delay("create_b", Duration::from_millis(20));
    let log = executor.dispatched();

    let report = with_timeout(runtime(&cfg, executor, rt_rx).run()).await?;

    assert!(report.succeeded());
    // One slot: dispatched strictly one after the other, in name order.
    assert_eq!(
        dispatched_names(&log),
        vec!["create_a", "create_b", "create_c"]
    );

    Ok(())
}

#[tokio::test]
async fn failed_task_is_retried_after_delay() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_default_retries(2, Duration::from_millis(30))
        .with_task("begin", TaskConfigBuilder::barrier().build())
        .with_task(
            "create_a",
            TaskConfigBuilder::create_table("a").after("begin").build(),
        )
        .with_task("end", TaskConfigBuilder::barrier().after("create_a").build())
        .build();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executor = FakeExecutor::new(rt_tx.clone())
        .script("create_a", vec![statement_error("lock timeout"), TaskOutcome::Succeeded]);
    let log = executor.dispatched();

    let started = tokio::time::Instant::now();
    let report = with_timeout(runtime(&cfg, executor, rt_rx).run()).await?;

    assert!(report.succeeded());
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            Dispatch { task: "create_a".into(), attempt: 1 },
            Dispatch { task: "create_a".into(), attempt: 2 },
        ]
    );
    assert_eq!(report.tasks["create_a"].attempts, 2);
    assert!(report.failures.is_empty());

    Ok(())
}

#[tokio::test]
async fn exhausted_retries_fail_run_and_skip_downstream() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_default_retries(1, Duration::from_millis(10))
        .with_task("begin", TaskConfigBuilder::barrier().build())
        .with_task(
            "create_a",
            TaskConfigBuilder::create_table("a").after("begin").build(),
        )
        .with_task(
            "create_b",
            TaskConfigBuilder::create_table("b").after("begin").build(),
        )
        .with_task(
            "sync",
            TaskConfigBuilder::barrier().after("create_a").after("create_b").build(),
        )
        .with_task(
            "load",
            TaskConfigBuilder::load_dimension("a", &["id"], "SELECT 1", true)
                .after("sync")
                .build(),
        )
        .with_task("end", TaskConfigBuilder::barrier().after("load").build())
        .build();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executor = FakeExecutor::new(rt_tx.clone()).script(
        "create_b",
        vec![statement_error("syntax error"), statement_error("syntax error")],
    );
    let log = executor.dispatched();

    let report = with_timeout(runtime(&cfg, executor, rt_rx).run()).await?;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].task, "create_b");
    assert_eq!(report.failures[0].attempts, 2);
    assert!(report.failures[0].error.contains("syntax error"));

    assert_eq!(report.tasks["create_a"].state, TaskState::Succeeded);
    assert_eq!(report.skipped, vec!["end", "load", "sync"]);
    assert!(!dispatched_names(&log).contains(&"load".to_string()));

    Ok(())
}

#[tokio::test]
async fn deadline_cancels_unstarted_tasks() -> TestResult {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_deadline(Duration::from_millis(50))
        .with_task("begin", TaskConfigBuilder::barrier().build())
        .with_task(
            "create_a",
            TaskConfigBuilder::create_table("a").after("begin").build(),
        )
        .with_task(
            "create_b",
            TaskConfigBuilder::create_table("b").after("create_a").build(),
        )
        .with_task("end", TaskConfigBuilder::barrier().after("create_b").build())
        .build();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executor = FakeExecutor::new(rt_tx.clone()).delay("create_a", Duration::from_millis(200));
    let log = executor.dispatched();

    let report = with_timeout(runtime(&cfg, executor, rt_rx).run()).await?;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.cancelled.as_deref(), Some("run deadline exceeded"));
    // The in-flight operator was allowed to finish, but its result no
    // longer counts.
    assert_eq!(report.tasks["create_a"].state, TaskState::Failed);
    assert_eq!(report.tasks["create_b"].state, TaskState::Skipped);
    assert_eq!(report.tasks["end"].state, TaskState::Skipped);
    assert_eq!(dispatched_names(&log), vec!["create_a".to_string()]);

    Ok(())
}

#[tokio::test]
async fn shutdown_request_drains_running_tasks() -> TestResult {
    init_tracing();

    let cfg = fan_out_config(1);
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executor = FakeExecutor::new(rt_tx.clone()).delay("create_a", Duration::from_millis(50));
    let log = executor.dispatched();

    let tx = rt_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
    });

    let report = with_timeout(runtime(&cfg, executor, rt_rx).run()).await?;

    assert_eq!(report.cancelled.as_deref(), Some("shutdown requested"));
    assert_eq!(dispatched_names(&log), vec!["create_a".to_string()]);
    for task in ["create_b", "create_c", "sync", "end"] {
        assert_eq!(report.tasks[task].state, TaskState::Skipped, "{task}");
    }

    Ok(())
}

#[tokio::test]
async fn out_of_range_deadline_is_ignored() -> TestResult {
    init_tracing();

    let cfg = simple_chain_config();
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executor = FakeExecutor::new(rt_tx.clone());
    let core = CoreRuntime::new(Scheduler::from_config(&cfg), Arc::new(SystemClock));
    let runtime = Runtime::new(core, rt_rx, executor).with_deadline(Some(Duration::MAX));

    let report = with_timeout(runtime.run()).await?;

    assert!(report.succeeded());
    assert!(report.cancelled.is_none());

    Ok(())
}
