// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - sleeping until the next retry or the deadline
//!
//! The core has no Tokio types and performs no IO, so it can be driven
//! step by step in tests together with a [`ManualClock`](super::ManualClock).

use std::sync::Arc;
use std::time::Instant;

use crate::dag::Scheduler;
use crate::engine::clock::Clock;
use crate::engine::event_handlers::{
    handle_cancellation, handle_retry_timer, handle_run_start, handle_task_completion, CoreStep,
};
use crate::engine::RuntimeEvent;
use crate::report::RunReport;

#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, clock: Arc<dyn Clock>) -> Self {
        Self { scheduler, clock }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// When the shell should wake up to release a retry.
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.scheduler.next_retry_at()
    }

    pub fn report(&self) -> RunReport {
        self.scheduler.report()
    }

    /// Seed the run and dispatch the first wave.
    pub fn start(&mut self) -> CoreStep {
        let now = self.clock.now();
        handle_run_start(&mut self.scheduler, now)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let now = self.clock.now();
        match event {
            RuntimeEvent::TaskCompleted {
                task,
                attempt,
                outcome,
            } => handle_task_completion(&mut self.scheduler, task, attempt, outcome, now),
            RuntimeEvent::RetryTimerElapsed => handle_retry_timer(&mut self.scheduler, now),
            RuntimeEvent::DeadlineExceeded => {
                handle_cancellation(&mut self.scheduler, "run deadline exceeded", now)
            }
            RuntimeEvent::ShutdownRequested => {
                handle_cancellation(&mut self.scheduler, "shutdown requested", now)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{ConfigFile, RawConfigFile};
    use crate::dag::TaskState;
    use crate::engine::{CoreCommand, ManualClock, TaskOutcome};
    use crate::operators::OperatorError;
    use crate::warehouse::GatewayError;

    fn core(clock: &ManualClock) -> CoreRuntime {
        let raw: RawConfigFile = toml::from_str(
            r#"
[default]
retries = 1
retry_delay = "5m"

[task.begin]
kind = "barrier"

[task.create]
kind = "create_table"
after = ["begin"]
table = "users"
sql = "CREATE TABLE IF NOT EXISTS users (id INT)"

[task.end]
kind = "barrier"
after = ["create"]
"#,
        )
        .unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();
        CoreRuntime::new(Scheduler::from_config(&cfg), Arc::new(clock.clone()))
    }

    fn connection_lost() -> TaskOutcome {
        TaskOutcome::Failed(OperatorError::Gateway(GatewayError::Connection(
            "server closed the connection".into(),
        )))
    }

    fn dispatched_names(step: &CoreStep) -> Vec<String> {
        step.dispatched().iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn retry_is_released_only_after_the_delay() {
        let clock = ManualClock::new();
        let mut core = core(&clock);

        let step = core.start();
        assert_eq!(dispatched_names(&step), vec!["create"]);

        let step = core.step(RuntimeEvent::TaskCompleted {
            task: "create".into(),
            attempt: 1,
            outcome: connection_lost(),
        });
        assert!(step.keep_running);
        assert!(step.dispatched().is_empty());
        assert_eq!(
            core.next_retry_at(),
            Some(clock.now() + Duration::from_secs(300))
        );

        clock.advance(Duration::from_secs(299));
        let step = core.step(RuntimeEvent::RetryTimerElapsed);
        assert!(step.dispatched().is_empty());

        clock.advance(Duration::from_secs(1));
        let step = core.step(RuntimeEvent::RetryTimerElapsed);
        let dispatched = step.dispatched();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].attempt, 2);

        let step = core.step(RuntimeEvent::TaskCompleted {
            task: "create".into(),
            attempt: 2,
            outcome: TaskOutcome::Succeeded,
        });
        assert!(!step.keep_running);
        assert!(matches!(step.commands.last(), Some(CoreCommand::RequestExit)));
        assert!(core.report().succeeded());
    }

    #[test]
    fn shutdown_waits_for_running_task() {
        let clock = ManualClock::new();
        let mut core = core(&clock);
        core.start();

        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(step.keep_running);
        assert_eq!(core.scheduler().state_of("end"), Some(TaskState::Skipped));

        let step = core.step(RuntimeEvent::TaskCompleted {
            task: "create".into(),
            attempt: 1,
            outcome: TaskOutcome::Succeeded,
        });
        assert!(!step.keep_running);

        let report = core.report();
        assert!(!report.succeeded());
        assert_eq!(report.cancelled.as_deref(), Some("shutdown requested"));
    }
}
