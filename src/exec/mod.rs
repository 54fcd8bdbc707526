// src/exec/mod.rs

//! Operator execution layer.
//!
//! Operators talk to the warehouse through a blocking client, so each
//! attempt runs on Tokio's blocking pool and reports back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the background loop that receives scheduled
//!   tasks and spawns one runner per attempt.
//! - [`task_runner`] runs a single operator attempt.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `OperatorExecutor` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, OperatorExecutor};
pub use executor_loop::spawn_executor;
