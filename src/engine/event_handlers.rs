// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Instant;

use tracing::{debug, info};

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::{TaskName, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Every task is terminal; the shell should stop and report.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    /// Tasks dispatched by this step, across all commands.
    pub fn dispatched(&self) -> Vec<&ScheduledTask> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks.iter()),
                CoreCommand::RequestExit => None,
            })
            .flatten()
            .collect()
    }
}

/// Seed the run.
pub fn handle_run_start(scheduler: &mut Scheduler, now: Instant) -> CoreStep {
    let step = scheduler.start_run(now);
    into_core_step(step)
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskName,
    attempt: u32,
    outcome: TaskOutcome,
    now: Instant,
) -> CoreStep {
    let step = scheduler.step_completion(&task, attempt, outcome, now);
    into_core_step(step)
}

/// A retry timer fired: release whatever is due.
pub fn handle_retry_timer(scheduler: &mut Scheduler, now: Instant) -> CoreStep {
    let step = scheduler.release_due_retries(now);
    if step.newly_scheduled.is_empty() {
        debug!("retry timer fired but nothing was due");
    }
    into_core_step(step)
}

/// Deadline or shutdown: stop dispatching and let in-flight work drain.
pub fn handle_cancellation(scheduler: &mut Scheduler, reason: &str, now: Instant) -> CoreStep {
    let step = scheduler.cancel(reason, now);
    if !step.run_just_finished && !scheduler.is_finished() {
        info!(
            running = scheduler.running_count(),
            "waiting for in-flight tasks to reach a transaction boundary"
        );
    }
    into_core_step(step)
}

/// Translate a scheduler step into shell commands.
fn into_core_step(step: SchedulerStep) -> CoreStep {
    let mut commands = Vec::new();

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    let keep_running = !step.run_just_finished;
    if step.run_just_finished {
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
