// src/dag/scheduler.rs

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::model::ConfigFile;
use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{TaskInfo, TaskState};
use crate::engine::{TaskName, TaskOutcome};
use crate::operators::OperatorError;
use crate::report::{RunReport, TaskFailure, TaskSummary};

/// The immutable DAG plus the mutable state of a single run.
///
/// Pure and synchronous: time is passed in, nothing is spawned. It decides
/// - which tasks are Ready (all upstreams Succeeded),
/// - how many of them may run at once,
/// - whether a failure is retried or skips everything downstream,
/// - when the run is over.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    tasks: HashMap<TaskName, TaskInfo>,
    parallelism: usize,
    started: bool,
    finished: bool,
    /// Set once the run is cancelled; in-flight results are then discarded.
    cancelled: Option<String>,
    /// Terminal failures in the order they happened.
    failure_order: Vec<TaskName>,
}

impl Scheduler {
    /// Construct a scheduler from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let graph = DagGraph::from_config(cfg);

        let tasks = cfg
            .task
            .iter()
            .map(|(name, tc)| {
                let deps = graph.dependencies_of(name).to_vec();
                let info =
                    TaskInfo::new(name.clone(), tc.operator.clone(), deps, cfg.retry_policy(name));
                (name.clone(), info)
            })
            .collect();

        Self {
            graph,
            tasks,
            parallelism: cfg.config.parallelism.max(1),
            started: false,
            finished: false,
            cancelled: None,
            failure_order: Vec::new(),
        }
    }

    /// Override `[config].parallelism` (clamped to at least 1).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// All task names, sorted.
    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.graph.tasks().collect();
        names.sort_unstable();
        names
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|info| info.state)
    }

    pub fn attempts_of(&self, task: &str) -> Option<u32> {
        self.tasks.get(task).map(|info| info.attempts)
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|info| info.state == TaskState::Running)
            .count()
    }

    /// Whether the dependencies of `task` have all succeeded.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        Some(ReadOnlyStateManager::new(&self.tasks).deps_satisfied_for_info(info))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Earliest pending retry, if any task is waiting for one.
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.tasks.values().filter_map(|info| info.retry_at).min()
    }

    /// Seed the run: tasks with no upstream become Ready and are dispatched
    /// up to the parallelism limit.
    pub fn start_run(&mut self, now: Instant) -> SchedulerStep {
        if self.started {
            warn!("start_run called twice; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;

        info!(
            tasks = self.tasks.len(),
            parallelism = self.parallelism,
            "starting DAG run"
        );

        self.advance(now, SchedulerStep::default())
    }

    /// Apply the outcome of one dispatched attempt.
    ///
    /// Completions for tasks that are not Running, or that carry an attempt
    /// number other than the current one, are stale and ignored.
    pub fn step_completion(
        &mut self,
        task: &str,
        attempt: u32,
        outcome: TaskOutcome,
        now: Instant,
    ) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(info) = self.tasks.get_mut(task) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return step;
        };

        if info.state != TaskState::Running || info.attempts != attempt {
            warn!(
                task = %task,
                attempt,
                current_attempt = info.attempts,
                state = %info.state,
                "stale completion; ignoring"
            );
            return step;
        }

        let outcome = match (&self.cancelled, outcome) {
            (Some(reason), TaskOutcome::Succeeded) => {
                info!(task = %task, "task finished after cancellation; forcing Failed");
                TaskOutcome::Failed(OperatorError::Cancelled(reason.clone()))
            }
            (_, outcome) => outcome,
        };

        match outcome {
            TaskOutcome::Succeeded => {
                info.state = TaskState::Succeeded;
                info.last_error = None;
                info!(task = %task, attempt, "task succeeded");
                step.newly_succeeded.push(task.to_string());
            }
            TaskOutcome::Failed(err) => {
                let retry = self.cancelled.is_none()
                    && err.is_retryable()
                    && info.has_retry_budget();

                info.state = TaskState::Failed;

                let retry_at = if retry {
                    let at = now.checked_add(info.retry.delay);
                    if at.is_none() {
                        warn!(
                            task = %task,
                            delay = ?info.retry.delay,
                            "retry delay out of range; not retrying"
                        );
                    }
                    at
                } else {
                    None
                };

                if let Some(at) = retry_at {
                    info.retry_at = Some(at);
                    warn!(
                        task = %task,
                        attempt,
                        max_attempts = info.retry.max_attempts(),
                        delay = ?info.retry.delay,
                        error = %err,
                        "task failed; will retry"
                    );
                    info.last_error = Some(err);
                    step.retry_scheduled.push(task.to_string());
                } else {
                    warn!(
                        task = %task,
                        attempt,
                        retryable = err.is_retryable(),
                        error = %err,
                        "task failed; skipping downstream tasks"
                    );
                    info.retry_at = None;
                    info.last_error = Some(err);
                    self.fail_terminally(task, &mut step);
                }
            }
        }

        self.advance(now, step)
    }

    /// Re-dispatch failed tasks whose retry delay has elapsed.
    pub fn release_due_retries(&mut self, now: Instant) -> SchedulerStep {
        self.advance(now, SchedulerStep::default())
    }

    /// Cancel the run.
    ///
    /// Tasks that have not started are Skipped, tasks waiting for a retry
    /// fail for good. Running tasks are left alone: their result is forced
    /// to Failed when it arrives.
    pub fn cancel(&mut self, reason: &str, now: Instant) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.cancelled.is_some() || self.finished {
            return step;
        }

        warn!(reason, running = self.running_count(), "cancelling run");
        self.cancelled = Some(reason.to_string());

        let mut names: Vec<TaskName> = self.tasks.keys().cloned().collect();
        names.sort_unstable();

        for name in names {
            let Some(info) = self.tasks.get_mut(&name) else {
                continue;
            };
            match info.state {
                TaskState::Pending | TaskState::Ready => {
                    info.state = TaskState::Skipped;
                    step.newly_skipped.push(name);
                }
                TaskState::Failed if info.awaiting_retry() => {
                    info.retry_at = None;
                    step.newly_failed.push(name.clone());
                    self.failure_order.push(name);
                }
                TaskState::Running
                | TaskState::Succeeded
                | TaskState::Failed
                | TaskState::Skipped => {}
            }
        }

        self.advance(now, step)
    }

    /// Snapshot of the run for reporting.
    pub fn report(&self) -> RunReport {
        let tasks = self
            .tasks
            .values()
            .map(|info| {
                (
                    info.name.clone(),
                    TaskSummary {
                        kind: info.operator.kind(),
                        state: info.state,
                        attempts: info.attempts,
                        error: info.last_error.as_ref().map(ToString::to_string),
                    },
                )
            })
            .collect();

        let failures = self
            .failure_order
            .iter()
            .filter_map(|name| self.tasks.get(name))
            .map(|info| TaskFailure {
                task: info.name.clone(),
                kind: info.operator.kind(),
                attempts: info.attempts,
                error: info
                    .last_error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })
            .collect();

        let mut skipped: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|info| info.state == TaskState::Skipped)
            .map(|info| info.name.clone())
            .collect();
        skipped.sort_unstable();

        let violations = self
            .failure_order
            .iter()
            .filter_map(|name| self.tasks.get(name))
            .filter_map(|info| info.last_error.as_ref())
            .flat_map(|err| err.violations().iter().cloned())
            .collect();

        RunReport::new(tasks, failures, skipped, violations, self.cancelled.clone())
    }

    fn fail_terminally(&mut self, task: &str, step: &mut SchedulerStep) {
        self.failure_order.push(task.to_string());
        step.newly_failed.push(task.to_string());

        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        step.newly_skipped.extend(manager.mark_dependents_skipped(task));
    }

    /// Common tail of every transition: promote, release retries, dispatch,
    /// and detect the end of the run.
    fn advance(&mut self, now: Instant, mut step: SchedulerStep) -> SchedulerStep {
        if self.finished {
            return step;
        }

        let mut manager = StateManager::new(&self.graph, &mut self.tasks);

        if self.cancelled.is_none() {
            let released = manager.release_due_retries(now);
            if !released.is_empty() {
                debug!(?released, "retries released");
            }
            step.newly_succeeded.extend(manager.settle());
            step.newly_scheduled
                .extend(manager.collect_dispatchable(self.parallelism));
        }

        if manager.all_tasks_terminal() {
            self.finished = true;
            step.run_just_finished = true;
            info!(
                failed = self.failure_order.len(),
                cancelled = self.cancelled.is_some(),
                "all tasks terminal; run finished"
            );
        }

        step
    }
}
