// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the main runtime event loop that reacts to:
//!   - task completion events
//!   - elapsed retry delays
//!   - the run deadline
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. Time reaches the core only through a
//! [`Clock`], so retry behaviour can be tested without waiting.

use crate::operators::OperatorError;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of one operator attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(OperatorError),
}

impl From<Result<(), OperatorError>> for TaskOutcome {
    fn from(res: Result<(), OperatorError>) -> Self {
        match res {
            Ok(()) => TaskOutcome::Succeeded,
            Err(err) => TaskOutcome::Failed(err),
        }
    }
}

/// Events flowing into the runtime from executors, timers and signals.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// An operator attempt finished.
    TaskCompleted {
        task: TaskName,
        attempt: u32,
        outcome: TaskOutcome,
    },
    /// The earliest pending retry delay may have elapsed.
    RetryTimerElapsed,
    /// The run exceeded its deadline.
    DeadlineExceeded,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod clock;
pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use clock::{Clock, ManualClock, SystemClock};
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
