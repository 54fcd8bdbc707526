// src/exec/executor_loop.rs

//! Background loop that turns scheduled tasks into running operators.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;
use crate::operators::OperatorContext;

/// Spawn the background executor loop.
///
/// The returned sender is what `OperatorExecutor` feeds. Each scheduled task
/// runs in its own Tokio task. A second dispatch of an attempt that is
/// already in flight is dropped with a warning.
pub fn spawn_executor(
    ctx: OperatorContext,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        // Latest attempt per task name.
        let mut active: HashMap<String, (u32, JoinHandle<()>)> = HashMap::new();

        while let Some(task) = rx.recv().await {
            active.retain(|_, (_, handle)| !handle.is_finished());

            if active
                .get(&task.name)
                .is_some_and(|(attempt, _)| *attempt == task.attempt)
            {
                warn!(
                    task = %task.name,
                    attempt = task.attempt,
                    "attempt already in flight; ignoring duplicate dispatch"
                );
                continue;
            }

            let name = task.name.clone();
            let attempt = task.attempt;
            let ctx = ctx.clone();
            let rt_tx = runtime_tx.clone();
            let spawn_name = name.clone();
            let handle = tokio::spawn(async move {
                run_task(task, ctx, rt_tx).await;
                debug!(task = %spawn_name, "task runner future finished");
            });
            active.insert(name, (attempt, handle));
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}
