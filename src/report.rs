// src/report.rs

//! Structured result of a run.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::dag::TaskState;
use crate::engine::TaskName;
use crate::operators::OperatorKind;
use crate::quality::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => f.write_str("succeeded"),
            RunStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Final view of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub kind: OperatorKind,
    pub state: TaskState,
    pub attempts: u32,
    /// Error of the last failed attempt, if the task ever failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A task that failed for good.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskFailure {
    pub task: TaskName,
    pub kind: OperatorKind,
    pub attempts: u32,
    pub error: String,
}

/// Run report: `Succeeded` iff every task succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub tasks: BTreeMap<TaskName, TaskSummary>,
    /// Terminal failures, in the order they happened.
    pub failures: Vec<TaskFailure>,
    pub skipped: Vec<TaskName>,
    /// Quality rule violations from failed quality checks.
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<String>,
}

impl RunReport {
    pub fn new(
        tasks: BTreeMap<TaskName, TaskSummary>,
        failures: Vec<TaskFailure>,
        skipped: Vec<TaskName>,
        violations: Vec<Violation>,
        cancelled: Option<String>,
    ) -> Self {
        let all_succeeded = !tasks.is_empty()
            && tasks.values().all(|t| t.state == TaskState::Succeeded);
        let status = if all_succeeded && cancelled.is_none() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        Self {
            status,
            tasks,
            failures,
            skipped,
            violations,
            cancelled,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let succeeded = self
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Succeeded)
            .count();
        writeln!(
            f,
            "run {}: {}/{} tasks succeeded",
            self.status,
            succeeded,
            self.tasks.len()
        )?;

        if let Some(reason) = &self.cancelled {
            writeln!(f, "  cancelled: {reason}")?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  failed: {} ({}, {} attempt(s)): {}",
                failure.task, failure.kind, failure.attempts, failure.error
            )?;
        }
        for violation in &self.violations {
            writeln!(f, "  violation: {violation}")?;
        }
        if !self.skipped.is_empty() {
            writeln!(f, "  skipped: {}", self.skipped.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(state: TaskState) -> TaskSummary {
        TaskSummary {
            kind: OperatorKind::CreateTable,
            state,
            attempts: 1,
            error: None,
        }
    }

    #[test]
    fn status_requires_every_task_to_succeed() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), summary(TaskState::Succeeded));
        let ok = RunReport::new(tasks.clone(), vec![], vec![], vec![], None);
        assert!(ok.succeeded());

        tasks.insert("b".to_string(), summary(TaskState::Skipped));
        let failed = RunReport::new(tasks, vec![], vec!["b".into()], vec![], None);
        assert_eq!(failed.status, RunStatus::Failed);
    }

    #[test]
    fn json_and_text_forms() {
        let mut tasks = BTreeMap::new();
        tasks.insert("check".to_string(), summary(TaskState::Failed));
        let report = RunReport::new(
            tasks,
            vec![TaskFailure {
                task: "check".into(),
                kind: OperatorKind::QualityCheck,
                attempts: 1,
                error: "data quality check failed".into(),
            }],
            vec![],
            vec![Violation::RowCountBelow {
                table: "users".into(),
                actual: 0,
                min: 1,
            }],
            None,
        );

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["tasks"]["check"]["state"], "failed");
        assert_eq!(json["violations"][0]["kind"], "row_count_below");
        assert!(json.get("cancelled").is_none());

        let text = report.to_string();
        assert!(text.starts_with("run failed: 0/1 tasks succeeded"));
        assert!(text.contains("failed: check (quality_check, 1 attempt(s))"));
        assert!(text.contains("violation: row_count for table users: 0 rows, expected at least 1"));
    }
}
