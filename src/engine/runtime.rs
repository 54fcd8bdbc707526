// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::report::RunReport;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// Drives the DAG scheduler in response to `RuntimeEvent`s,
/// and delegates operator execution to an `ExecutorBackend`.
///
/// All run semantics live in `CoreRuntime`. This struct only does async IO:
/// waiting on the event channel, sleeping until the next retry or the
/// deadline, and handing tasks to the executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    deadline: Option<Duration>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            deadline: None,
        }
    }

    /// Cancel the run once `deadline` has elapsed since [`Runtime::run`] began.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Main event loop. Returns the report once every task is terminal.
    ///
    /// Operator failures never surface as `Err`; they are in the report.
    /// `Err` means the shell itself broke (e.g. the executor went away).
    pub async fn run(mut self) -> Result<RunReport> {
        info!("loadgraph runtime started");

        let mut deadline = self.deadline.and_then(|d| {
            let at = TokioInstant::now().checked_add(d);
            if at.is_none() {
                warn!(deadline = ?d, "deadline out of range; running without one");
            }
            at
        });

        let step = self.core.start();
        if !self.apply(step).await? {
            info!("run finished without dispatching any task");
            return Ok(self.core.report());
        }

        loop {
            let retry_in = self
                .core
                .next_retry_at()
                .map(|at| at.saturating_duration_since(self.core.now()));

            let event = tokio::select! {
                maybe = self.event_rx.recv() => match maybe {
                    Some(e) => e,
                    None => {
                        warn!("runtime event channel closed before the run finished");
                        break;
                    }
                },
                _ = sleep_for(retry_in) => RuntimeEvent::RetryTimerElapsed,
                _ = sleep_until(deadline) => {
                    deadline = None;
                    RuntimeEvent::DeadlineExceeded
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            if !self.apply(step).await? {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(self.core.report())
    }

    /// Execute the commands of one core step. Returns `keep_running`.
    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            match command {
                CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await?,
                CoreCommand::RequestExit => debug!("core issued RequestExit command"),
            }
        }
        Ok(step.keep_running)
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        debug!(?names, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<TokioInstant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
