//! Task execution engine.
//!
//! Core components:
//! - `gate`: DependencyGate (may this task run yet?)
//! - `runner`: TaskRunner state machine (gate → claim → job → persist)
//! - `aggregator`: WorkflowAggregator (workflow status from task set)
//! - `poller`: scheduler loop picking queued tasks

pub mod aggregator;
pub mod gate;
pub mod poller;
pub mod runner;

pub use aggregator::{Summary, WorkflowAggregator, summarize};
pub use gate::{DependencyGate, GateDecision};
pub use poller::{poll_once, reset_stale_tasks, spawn_task_poller};
pub use runner::{RunOutcome, TaskRunner};
