//! Task executor: drives one task through gate, claim, job and persistence.
//!
//! State machine for a single run:
//!
//! ```text
//! gate ─ Blocked ───────────▶ (no write)
//!      ─ misconfigured ─────▶ Failed ─▶ aggregate
//!      ─ PredecessorFailed ─▶ Failed ─▶ aggregate
//!      ─ Ready ─▶ lookup ─ unknown ─▶ Failed ─▶ aggregate
//!                        ─ found ───▶ claim (queued → in_progress)
//!                                       ├─ lost ─▶ Skipped
//!                                       └─ job ─ Waiting ─▶ Queued
//!                                              ─ Value ───▶ Result row ─▶ Completed ─▶ aggregate
//!                                              ─ Err ─────▶ Failed ─▶ aggregate
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TaskError;
use crate::jobs::{JobRegistry, Outcome};
use crate::store::Database;
use crate::worker::aggregator::WorkflowAggregator;
use crate::worker::gate::{DependencyGate, GateDecision};
use crate::workflows::model::{Task, TaskResult, TaskStatus};

/// Progress marker written when a task is claimed.
pub const PROGRESS_STARTING: &str = "starting job...";
/// Progress marker written when a job asks to wait.
pub const PROGRESS_WAITING: &str = "waiting...";

/// What a single `run` did to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Predecessor not finished; nothing was written.
    Blocked,
    /// The job asked to wait; the task is queued again.
    Waiting,
    /// The job produced a value, stored as `result_id`.
    Completed { result_id: Uuid },
    /// Another consumer claimed the task first.
    Skipped,
}

pub struct TaskRunner {
    store: Arc<dyn Database>,
    registry: Arc<JobRegistry>,
    gate: DependencyGate,
    aggregator: WorkflowAggregator,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn Database>, registry: Arc<JobRegistry>) -> Self {
        Self {
            gate: DependencyGate::new(store.clone()),
            aggregator: WorkflowAggregator::new(store.clone()),
            store,
            registry,
        }
    }

    /// Run `task` once.
    ///
    /// Job failures and configuration errors are persisted as `Failed`
    /// before the error is returned, so callers only need to log.
    pub async fn run(&self, mut task: Task) -> Result<RunOutcome, TaskError> {
        let decision = match self.gate.evaluate(&task).await {
            Ok(decision) => decision,
            Err(e) if e.is_configuration() => return self.reject(&mut task, e).await,
            Err(e) => return Err(e),
        };

        let input = match decision {
            GateDecision::Blocked => {
                debug!(task_id = %task.id, "Task blocked on dependency");
                return Ok(RunOutcome::Blocked);
            }
            GateDecision::PredecessorFailed { dependency_id } => {
                warn!(
                    task_id = %task.id,
                    dependency_id = %dependency_id,
                    "Dependency failed, failing task"
                );
                self.finish(&mut task, TaskStatus::Failed).await?;
                return Err(TaskError::PredecessorFailed {
                    task_id: task.id,
                    dependency_id,
                });
            }
            GateDecision::Ready { input } => input,
        };

        let Some(job) = self.registry.get(&task.task_type) else {
            let err = TaskError::UnknownTaskType {
                task_type: task.task_type.clone(),
            };
            return self.reject(&mut task, err).await;
        };

        task.input = input;
        task.status = TaskStatus::InProgress;
        task.progress = Some(PROGRESS_STARTING.into());
        task.updated_at = Utc::now();
        if !self.store.claim_task(&task).await? {
            debug!(task_id = %task.id, "Task already claimed, skipping");
            return Ok(RunOutcome::Skipped);
        }

        info!(
            task_id = %task.id,
            workflow_id = %task.workflow_id,
            task_type = %task.task_type,
            "Starting job"
        );

        match job.execute(&task).await {
            Ok(Outcome::Waiting) => {
                task.status = TaskStatus::Queued;
                task.progress = Some(PROGRESS_WAITING.into());
                task.updated_at = Utc::now();
                self.store.update_task(&task).await?;
                info!(task_id = %task.id, task_type = %task.task_type, "Job waiting, task re-queued");
                Ok(RunOutcome::Waiting)
            }
            Ok(Outcome::Value(value)) => {
                let data = if value.is_null() {
                    "{}".to_string()
                } else {
                    value.to_string()
                };
                let result = TaskResult::new(task.id, data);
                self.store.insert_result(&result).await?;

                task.result_id = Some(result.id);
                task.output = Some(result.data);
                self.finish(&mut task, TaskStatus::Completed).await?;
                info!(
                    task_id = %task.id,
                    workflow_id = %task.workflow_id,
                    result_id = %result.id,
                    "Task completed"
                );
                Ok(RunOutcome::Completed {
                    result_id: result.id,
                })
            }
            Err(source) => {
                warn!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    error = %source,
                    "Job failed"
                );
                self.finish(&mut task, TaskStatus::Failed).await?;
                Err(TaskError::JobFailed {
                    task_id: task.id,
                    task_type: task.task_type.clone(),
                    source,
                })
            }
        }
    }

    /// A task that can never run as wired: fail it so it leaves the queue.
    async fn reject(&self, task: &mut Task, err: TaskError) -> Result<RunOutcome, TaskError> {
        warn!(
            task_id = %task.id,
            task_type = %task.task_type,
            error = %err,
            "Task misconfigured, failing task"
        );
        self.finish(task, TaskStatus::Failed).await?;
        Err(err)
    }

    /// Terminal transition: persist, then recompute the workflow.
    async fn finish(&self, task: &mut Task, status: TaskStatus) -> Result<(), TaskError> {
        task.status = status;
        task.progress = None;
        task.updated_at = Utc::now();
        self.store.update_task(task).await?;
        self.aggregator.recompute(task.workflow_id).await?;
        Ok(())
    }
}
