//! Report job: the join (barrier) job of a workflow.
//!
//! Runs only once every other task of the workflow has reached a terminal
//! status; until then it answers `Outcome::Waiting` and the task goes back
//! to the queue.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::error::JobError;
use crate::jobs::job::{Job, Outcome};
use crate::store::Database;
use crate::workflows::model::{Task, TaskSummary};

pub struct ReportJob {
    store: Arc<dyn Database>,
}

impl ReportJob {
    pub fn new(store: Arc<dyn Database>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Job for ReportJob {
    fn task_type(&self) -> &str {
        "report"
    }

    fn description(&self) -> &str {
        "Compile the outputs of every other task in the workflow"
    }

    async fn execute(&self, task: &Task) -> Result<Outcome, JobError> {
        let siblings: Vec<Task> = self
            .store
            .list_workflow_tasks(task.workflow_id)
            .await?
            .into_iter()
            .filter(|t| t.id != task.id)
            .collect();

        if siblings.is_empty() {
            return Err(JobError::NothingToReport {
                workflow_id: task.workflow_id,
            });
        }

        if let Some(pending) = siblings.iter().find(|t| t.status.is_pending()) {
            debug!(
                task_id = %task.id,
                pending_task_id = %pending.id,
                status = %pending.status,
                "Report waiting on sibling"
            );
            return Ok(Outcome::Waiting);
        }

        info!(
            task_id = %task.id,
            workflow_id = %task.workflow_id,
            tasks = siblings.len(),
            "Generating workflow report"
        );

        let tasks: Vec<TaskSummary> = siblings.iter().map(TaskSummary::from_task).collect();
        let final_report = format!(
            "Report for workflow {}: {}",
            task.workflow_id,
            serde_json::to_string(&tasks)?
        );

        Ok(Outcome::Value(json!({
            "workflowId": task.workflow_id,
            "tasks": tasks,
            "finalReport": final_report,
        })))
    }
}
