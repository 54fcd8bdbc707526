use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use loadgraph::dag::ScheduledTask;
use loadgraph::engine::{RuntimeEvent, TaskOutcome};
use loadgraph::exec::ExecutorBackend;
use loadgraph::errors::Result;

/// One dispatch seen by the fake executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub task: String,
    pub attempt: u32,
}

/// A fake executor that:
/// - records which tasks were dispatched, in order
/// - completes each one with the next scripted outcome for that task,
///   or `Succeeded` once the script for it runs out
/// - optionally holds a task "running" for a fixed time first.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    dispatched: Arc<Mutex<Vec<Dispatch>>>,
    scripts: Arc<Mutex<HashMap<String, VecDeque<TaskOutcome>>>>,
    delays: HashMap<String, Duration>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            dispatched: Arc::new(Mutex::new(Vec::new())),
            scripts: Arc::new(Mutex::new(HashMap::new())),
            delays: HashMap::new(),
        }
    }

    /// Queue outcomes for successive attempts of `task`.
    pub fn script(self, task: &str, outcomes: Vec<TaskOutcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(task.to_string(), outcomes.into());
        self
    }

    /// Report completion of `task` only after `delay`.
    pub fn delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    /// Shared handle to the dispatch log; stays valid after the runtime
    /// consumes the executor.
    pub fn dispatched(&self) -> Arc<Mutex<Vec<Dispatch>>> {
        Arc::clone(&self.dispatched)
    }
}

/// Task names from a dispatch log, in dispatch order.
pub fn dispatched_names(log: &Arc<Mutex<Vec<Dispatch>>>) -> Vec<String> {
    log.lock().unwrap().iter().map(|d| d.task.clone()).collect()
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let dispatched = Arc::clone(&self.dispatched);
        let scripts = Arc::clone(&self.scripts);
        let delays = self.delays.clone();

        Box::pin(async move {
            for t in tasks {
                dispatched.lock().unwrap().push(Dispatch {
                    task: t.name.clone(),
                    attempt: t.attempt,
                });

                let outcome = scripts
                    .lock()
                    .unwrap()
                    .get_mut(&t.name)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(TaskOutcome::Succeeded);
                let delay = delays.get(&t.name).copied();
                let tx = tx.clone();

                // Complete from a separate task so the runtime is never
                // blocked on its own event channel.
                tokio::spawn(async move {
                    if let Some(d) = delay {
                        tokio::time::sleep(d).await;
                    }
                    let _ = tx
                        .send(RuntimeEvent::TaskCompleted {
                            task: t.name,
                            attempt: t.attempt,
                            outcome,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }
}
