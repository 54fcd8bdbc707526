// src/dag/task_info.rs

//! Task metadata and per-run state.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::engine::TaskName;
use crate::operators::{Operator, OperatorError};

/// Lifecycle of a task within one run.
///
/// `Failed` is terminal only when no retry is pending; see
/// [`TaskInfo::awaiting_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting on at least one upstream task.
    Pending,
    /// Every upstream succeeded; waiting for a dispatch slot.
    Ready,
    Running,
    Succeeded,
    Failed,
    /// Never ran because an upstream failed or the run was cancelled.
    Skipped,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        delay: Duration::ZERO,
    };

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

/// Static task information derived from config, plus per-run state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub operator: Operator,
    /// Direct dependencies (names in `after = [...]`).
    pub deps: Vec<TaskName>,
    pub retry: RetryPolicy,

    pub state: TaskState,
    /// Number of times this task has been dispatched.
    pub attempts: u32,
    /// Set while a failed task waits for its next attempt.
    pub retry_at: Option<Instant>,
    pub last_error: Option<OperatorError>,
}

impl TaskInfo {
    pub fn new(name: TaskName, operator: Operator, deps: Vec<TaskName>, retry: RetryPolicy) -> Self {
        Self {
            name,
            operator,
            deps,
            retry,
            state: TaskState::Pending,
            attempts: 0,
            retry_at: None,
            last_error: None,
        }
    }

    pub fn awaiting_retry(&self) -> bool {
        self.state == TaskState::Failed && self.retry_at.is_some()
    }

    /// Succeeded, Skipped, or Failed with no retry pending.
    pub fn is_terminal(&self) -> bool {
        match self.state {
            TaskState::Succeeded | TaskState::Skipped => true,
            TaskState::Failed => self.retry_at.is_none(),
            TaskState::Pending | TaskState::Ready | TaskState::Running => false,
        }
    }

    /// Whether a failure on the current attempt may be retried.
    pub fn has_retry_budget(&self) -> bool {
        self.attempts < self.retry.max_attempts()
    }
}

/// A task the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub operator: Operator,
    /// 1-based attempt number; echoed back on completion so stale results
    /// from an earlier attempt can be told apart.
    pub attempt: u32,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo) -> Self {
        Self {
            name: info.name.clone(),
            operator: info.operator.clone(),
            attempt: info.attempts,
        }
    }
}
