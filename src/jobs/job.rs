//! Job contract: what a task's work looks like to the executor.

use async_trait::async_trait;

use crate::error::JobError;
use crate::workflows::model::Task;

/// Non-error result of running a job.
///
/// Together with `Err(JobError)` this forms the three-way outcome the
/// executor matches on.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The job finished and produced a value to persist.
    Value(serde_json::Value),
    /// The job cannot finish yet (e.g. a join waiting on siblings).
    /// The task goes back to the queue.
    Waiting,
}

/// A unit of work bound to a task type.
#[async_trait]
pub trait Job: Send + Sync {
    /// Task type string this job handles.
    fn task_type(&self) -> &str;

    /// Short human-readable description.
    fn description(&self) -> &str;

    /// Run the job for `task`.
    async fn execute(&self, task: &Task) -> Result<Outcome, JobError>;
}
