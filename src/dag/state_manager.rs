// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dag::task_info::{ScheduledTask, TaskInfo, TaskState};
use crate::dag::DagGraph;
use crate::engine::TaskName;

/// Mutable view over the task map used by the scheduler for one transition.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DagGraph, tasks: &'a mut HashMap<TaskName, TaskInfo>) -> Self {
        Self { graph, tasks }
    }

    /// Whether every upstream of `info` has Succeeded.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        ReadOnlyStateManager::new(self.tasks).deps_satisfied_for_info(info)
    }

    /// Move every Pending task whose upstreams all succeeded to Ready, and
    /// complete Ready barriers on the spot.
    ///
    /// Barriers cascade, so this loops until nothing changes. Returns the
    /// barriers that succeeded.
    pub fn settle(&mut self) -> Vec<TaskName> {
        let mut barriers_done = Vec::new();

        loop {
            let candidates: Vec<TaskName> = sorted_names(self.tasks.values().filter(|info| {
                info.state == TaskState::Pending && self.deps_satisfied_for_info(info)
            }));

            if candidates.is_empty() {
                break;
            }

            for name in candidates {
                let Some(info) = self.tasks.get_mut(&name) else {
                    continue;
                };
                if info.operator.is_barrier() {
                    info.state = TaskState::Succeeded;
                    debug!(task = %info.name, "barrier passed");
                    barriers_done.push(name);
                } else {
                    info.state = TaskState::Ready;
                    debug!(task = %info.name, "dependencies satisfied; marking Ready");
                }
            }
        }

        barriers_done
    }

    /// Failed tasks whose retry delay has elapsed re-enter Ready.
    pub fn release_due_retries(&mut self, now: Instant) -> Vec<TaskName> {
        let due: Vec<TaskName> = sorted_names(
            self.tasks
                .values()
                .filter(|info| info.retry_at.is_some_and(|at| at <= now)),
        );

        for name in &due {
            if let Some(info) = self.tasks.get_mut(name) {
                info.retry_at = None;
                info.state = TaskState::Ready;
                debug!(task = %info.name, attempts = info.attempts, "retry delay elapsed; marking Ready");
            }
        }

        due
    }

    /// Mark every not-yet-started transitive dependent of `failed_task` as
    /// Skipped.
    ///
    /// Returns the newly skipped tasks (excluding the root).
    pub fn mark_dependents_skipped(&mut self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed_task).to_vec();
        let mut visited: HashSet<TaskName> = HashSet::new();
        let mut newly_skipped = Vec::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(info) = self.tasks.get_mut(&name) else {
                warn!(task = %name, "node in DAG not present in tasks map");
                continue;
            };

            match info.state {
                TaskState::Pending | TaskState::Ready => {
                    info.state = TaskState::Skipped;
                    debug!(
                        task = %info.name,
                        upstream = failed_task,
                        "skipping task due to upstream failure"
                    );
                    newly_skipped.push(name.clone());
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
                TaskState::Skipped => {
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
                TaskState::Running | TaskState::Succeeded | TaskState::Failed => {}
            }
        }

        newly_skipped.sort_unstable();
        newly_skipped
    }

    /// Move Ready tasks to Running while fewer than `parallelism` are running.
    ///
    /// Candidates are taken in name order so runs are reproducible.
    pub fn collect_dispatchable(&mut self, parallelism: usize) -> Vec<ScheduledTask> {
        let running = self
            .tasks
            .values()
            .filter(|info| info.state == TaskState::Running)
            .count();
        let free = parallelism.saturating_sub(running);
        if free == 0 {
            return Vec::new();
        }

        let candidates: Vec<TaskName> = sorted_names(
            self.tasks
                .values()
                .filter(|info| info.state == TaskState::Ready),
        );

        let mut scheduled = Vec::new();
        for name in candidates.into_iter().take(free) {
            if let Some(info) = self.tasks.get_mut(&name) {
                info.state = TaskState::Running;
                info.attempts += 1;

                if info.attempts > 1 {
                    info!(
                        task = %info.name,
                        attempt = info.attempts,
                        max_attempts = info.retry.max_attempts(),
                        "retrying task"
                    );
                } else {
                    info!(task = %info.name, kind = %info.operator.kind(), "dispatching task");
                }

                scheduled.push(ScheduledTask::from_task_info(info));
            }
        }

        scheduled
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.values().all(TaskInfo::is_terminal)
    }
}

/// Read-only view used where only shared access to the task map exists.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a HashMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a HashMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// Whether every dependency of `info` has Succeeded in this run.
    ///
    /// A barrier uses the same rule: all upstreams, never a quorum.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        info.deps.iter().all(|dep| {
            self.tasks
                .get(dep)
                .is_some_and(|d| d.state == TaskState::Succeeded)
        })
    }
}

fn sorted_names<'t>(infos: impl Iterator<Item = &'t TaskInfo>) -> Vec<TaskName> {
    let mut names: Vec<TaskName> = infos.map(|info| info.name.clone()).collect();
    names.sort_unstable();
    names
}
