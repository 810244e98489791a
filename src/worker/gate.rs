//! Dependency gate: decides whether a task may run right now.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::TaskError;
use crate::store::Database;
use crate::workflows::model::{Task, TaskStatus};

/// Verdict of the dependency gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The task may run. `input` is the predecessor's output, if any.
    Ready { input: Option<String> },
    /// The predecessor hasn't finished yet.
    Blocked,
    /// The predecessor failed; this task can never run.
    PredecessorFailed { dependency_id: Uuid },
}

/// Read-only check of a task's single predecessor.
pub struct DependencyGate {
    store: Arc<dyn Database>,
}

impl DependencyGate {
    pub fn new(store: Arc<dyn Database>) -> Self {
        Self { store }
    }

    /// Evaluate `task` against a fresh read of its predecessor.
    pub async fn evaluate(&self, task: &Task) -> Result<GateDecision, TaskError> {
        let Some(dependency_id) = task.dependency else {
            return Ok(GateDecision::Ready { input: None });
        };

        let predecessor = self.store.get_task(dependency_id).await?.ok_or(
            TaskError::DependencyNotFound {
                task_id: task.id,
                dependency_id,
            },
        )?;

        if predecessor.workflow_id != task.workflow_id {
            return Err(TaskError::CrossWorkflowDependency {
                task_id: task.id,
                dependency_id,
            });
        }

        Ok(match predecessor.status {
            TaskStatus::Completed => GateDecision::Ready {
                input: predecessor.output,
            },
            TaskStatus::Failed => GateDecision::PredecessorFailed { dependency_id },
            TaskStatus::Queued | TaskStatus::InProgress => GateDecision::Blocked,
        })
    }
}
