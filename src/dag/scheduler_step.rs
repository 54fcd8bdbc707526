// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskName;

/// Structured result of a single scheduler "step".
///
/// Tests use it to drive the DAG by hand and assert on what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks moved to Running in this step; the executor must run them.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that reached Succeeded in this step without being dispatched
    /// (barriers) or whose successful completion was processed.
    pub newly_succeeded: Vec<TaskName>,
    /// Tasks that failed for good in this step.
    pub newly_failed: Vec<TaskName>,
    /// Tasks that failed but will be retried after their delay.
    pub retry_scheduled: Vec<TaskName>,
    /// Tasks skipped in this step.
    pub newly_skipped: Vec<TaskName>,
    /// Whether this step left every task in a terminal state.
    pub run_just_finished: bool,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.newly_scheduled.is_empty()
            && self.newly_succeeded.is_empty()
            && self.newly_failed.is_empty()
            && self.retry_scheduled.is_empty()
            && self.newly_skipped.is_empty()
            && !self.run_just_finished
    }
}
