// src/exec/task_runner.rs

//! Individual operator attempt runner.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::operators::{self, OperatorContext, OperatorError};

/// Run one attempt of `task` and report the outcome as `TaskCompleted`.
///
/// The operator runs on the blocking pool. A panic inside it becomes
/// `OperatorError::Panicked` so the scheduler still hears back.
pub async fn run_task(
    task: ScheduledTask,
    ctx: OperatorContext,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let ScheduledTask {
        name,
        operator,
        attempt,
    } = task;

    info!(task = %name, attempt, kind = %operator.kind(), "starting operator");
    let started = Instant::now();

    let joined = tokio::task::spawn_blocking(move || operators::execute(&operator, &ctx)).await;

    let result = match joined {
        Ok(res) => res,
        Err(join_err) => Err(OperatorError::Panicked(join_err.to_string())),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => info!(task = %name, attempt, elapsed_ms, "operator succeeded"),
        Err(err) => error!(task = %name, attempt, elapsed_ms, error = %err, "operator failed"),
    }

    let event = RuntimeEvent::TaskCompleted {
        task: name.clone(),
        attempt,
        outcome: TaskOutcome::from(result),
    };
    if runtime_tx.send(event).await.is_err() {
        warn!(task = %name, attempt, "runtime gone; dropping completion");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::operators::{CreateTableSpec, Operator};
    use crate::storage::S3Locator;
    use crate::types::RunContext;
    use crate::warehouse::mock::MockWarehouse;
    use crate::warehouse::{GatewayError, Row, WarehouseGateway};

    fn ctx(warehouse: Arc<MockWarehouse>) -> OperatorContext {
        let run = RunContext::for_month(2018, 11).unwrap();
        OperatorContext::new(warehouse, Arc::new(S3Locator::with_lookup(|_| None)), run)
    }

    fn create(table: &str) -> Operator {
        Operator::CreateTable(CreateTableSpec {
            table: table.into(),
            sql: format!("CREATE TABLE IF NOT EXISTS {table} (id INT)"),
        })
    }

    #[tokio::test]
    async fn reports_success_with_attempt_number() {
        let warehouse = Arc::new(MockWarehouse::new());
        let (tx, mut rx) = mpsc::channel(4);
        let task = ScheduledTask {
            name: "create_users".into(),
            operator: create("users"),
            attempt: 2,
        };

        run_task(task, ctx(warehouse.clone()), tx).await;

        match rx.recv().await {
            Some(RuntimeEvent::TaskCompleted { task, attempt, outcome }) => {
                assert_eq!(task, "create_users");
                assert_eq!(attempt, 2);
                assert_eq!(outcome, TaskOutcome::Succeeded);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(warehouse.table_exists("users"));
    }

    #[tokio::test]
    async fn reports_gateway_failure() {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.fail_when(
            "CREATE TABLE IF NOT EXISTS users",
            GatewayError::Statement("permission denied".into()),
            None,
        );
        let (tx, mut rx) = mpsc::channel(4);
        let task = ScheduledTask {
            name: "create_users".into(),
            operator: create("users"),
            attempt: 1,
        };

        run_task(task, ctx(warehouse), tx).await;

        match rx.recv().await {
            Some(RuntimeEvent::TaskCompleted { outcome: TaskOutcome::Failed(err), .. }) => {
                assert!(err.to_string().contains("permission denied"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    struct Exploding;

    impl WarehouseGateway for Exploding {
        fn execute(&self, _statement: &str) -> Result<(), GatewayError> {
            panic!("connection state corrupted");
        }

        fn query(&self, _statement: &str) -> Result<Vec<Row>, GatewayError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn panic_becomes_non_retryable_failure() {
        let run = RunContext::for_month(2018, 11).unwrap();
        let ctx = OperatorContext::new(
            Arc::new(Exploding),
            Arc::new(S3Locator::with_lookup(|_| None)),
            run,
        );
        let (tx, mut rx) = mpsc::channel(4);
        let task = ScheduledTask {
            name: "create_users".into(),
            operator: create("users"),
            attempt: 1,
        };

        run_task(task, ctx, tx).await;

        match rx.recv().await {
            Some(RuntimeEvent::TaskCompleted { outcome: TaskOutcome::Failed(err), .. }) => {
                assert!(matches!(err, OperatorError::Panicked(_)), "{err:?}");
                assert!(!err.is_retryable());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
