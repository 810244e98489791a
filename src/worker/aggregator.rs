//! Workflow aggregator: derives a workflow's status from its tasks.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::TaskError;
use crate::store::Database;
use crate::workflows::model::{Task, TaskSummary, Workflow, WorkflowStatus};

/// Derived status plus, when terminal, the composed summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub status: WorkflowStatus,
    pub final_result: Option<String>,
}

/// Pure status derivation over a workflow's full task set.
///
/// Failed wins over Completed; anything else is InProgress.
pub fn summarize(tasks: &[Task]) -> Summary {
    let any_failed = tasks.iter().any(Task::is_failed);
    let all_completed = tasks.iter().all(Task::is_completed);

    let status = if any_failed {
        WorkflowStatus::Failed
    } else if all_completed {
        WorkflowStatus::Completed
    } else {
        WorkflowStatus::InProgress
    };

    let final_result = status.is_terminal().then(|| {
        let entries: Vec<TaskSummary> = tasks.iter().map(TaskSummary::from_task).collect();
        // A Vec of plain structs always serializes.
        let json = serde_json::to_string(&entries).unwrap_or_else(|_| "[]".into());
        format!("Workflow execution summary: {json}")
    });

    Summary {
        status,
        final_result,
    }
}

/// Recomputes and persists workflow status after task transitions.
pub struct WorkflowAggregator {
    store: Arc<dyn Database>,
}

impl WorkflowAggregator {
    pub fn new(store: Arc<dyn Database>) -> Self {
        Self { store }
    }

    /// Reload the workflow and all its tasks, derive status, persist.
    ///
    /// Idempotent: running it twice without task changes writes the same
    /// status and final result.
    pub async fn recompute(&self, workflow_id: Uuid) -> Result<Workflow, TaskError> {
        let mut workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or(TaskError::WorkflowNotFound { id: workflow_id })?;
        let tasks = self.store.list_workflow_tasks(workflow_id).await?;

        let summary = summarize(&tasks);
        let changed = summary.status != workflow.status;

        workflow.status = summary.status;
        workflow.final_result = summary.final_result;
        workflow.updated_at = Utc::now();
        self.store.update_workflow(&workflow).await?;

        if changed {
            info!(
                workflow_id = %workflow.id,
                status = %workflow.status,
                tasks = tasks.len(),
                "Workflow status changed"
            );
        }
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use crate::workflows::model::TaskStatus;

    fn tasks_with(statuses: &[TaskStatus]) -> Vec<Task> {
        let workflow_id = Uuid::new_v4();
        statuses
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let t = Task::new(workflow_id, i as u32 + 1, "c", "area", "{}").with_status(*s);
                if *s == TaskStatus::Completed {
                    t.with_output(format!("out-{i}"))
                } else {
                    t
                }
            })
            .collect()
    }

    #[test]
    fn any_failed_wins() {
        use TaskStatus::*;
        for statuses in [
            vec![Failed, Completed],
            vec![Completed, Failed, Queued],
            vec![InProgress, Failed],
        ] {
            assert_eq!(summarize(&tasks_with(&statuses)).status, WorkflowStatus::Failed);
        }
    }

    #[test]
    fn all_completed_is_completed() {
        let summary = summarize(&tasks_with(&[TaskStatus::Completed, TaskStatus::Completed]));
        assert_eq!(summary.status, WorkflowStatus::Completed);
        assert!(summary.final_result.unwrap().starts_with("Workflow execution summary: ["));
    }

    #[test]
    fn otherwise_in_progress_without_result() {
        let summary = summarize(&tasks_with(&[TaskStatus::Completed, TaskStatus::Queued]));
        assert_eq!(summary.status, WorkflowStatus::InProgress);
        assert!(summary.final_result.is_none());
    }

    #[test]
    fn final_result_lists_each_task() {
        let tasks = tasks_with(&[TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Queued]);
        let final_result = summarize(&tasks).final_result.unwrap();
        let listed = final_result
            .strip_prefix("Workflow execution summary: ")
            .unwrap();

        let expected = serde_json::json!([
            {"taskId": tasks[0].id, "type": "area", "output": "out-0"},
            {"taskId": tasks[1].id, "type": "area", "isFailed": true},
            {"taskId": tasks[2].id, "type": "area", "isPending": true},
        ]);
        assert_eq!(serde_json::from_str::<serde_json::Value>(listed).unwrap(), expected);
        assert!(listed.starts_with(&format!(r#"[{{"taskId":"{}","type":"area""#, tasks[0].id)));
    }

    #[tokio::test]
    async fn recompute_persists_and_is_idempotent() {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let workflow = Workflow::new("c", "w");
        let tasks = vec![
            Task::new(workflow.id, 1, "c", "area", "{}")
                .with_status(TaskStatus::Completed)
                .with_output("1"),
            Task::new(workflow.id, 2, "c", "report", "{}").with_status(TaskStatus::Completed),
        ];
        store.create_workflow(&workflow, &tasks).await.unwrap();

        let aggregator = WorkflowAggregator::new(store.clone());
        let first = aggregator.recompute(workflow.id).await.unwrap();
        let second = aggregator.recompute(workflow.id).await.unwrap();

        assert_eq!(first.status, WorkflowStatus::Completed);
        assert_eq!(first.status, second.status);
        assert_eq!(first.final_result, second.final_result);

        let stored = store.get_workflow(workflow.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::Completed);
        assert_eq!(stored.final_result, first.final_result);
    }

    #[tokio::test]
    async fn recompute_moves_initial_to_in_progress() {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let workflow = Workflow::new("c", "w");
        let tasks = vec![Task::new(workflow.id, 1, "c", "area", "{}")];
        store.create_workflow(&workflow, &tasks).await.unwrap();

        let updated = WorkflowAggregator::new(store).recompute(workflow.id).await.unwrap();
        assert_eq!(updated.status, WorkflowStatus::InProgress);
        assert!(updated.final_result.is_none());
    }

    #[tokio::test]
    async fn recompute_unknown_workflow() {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let err = WorkflowAggregator::new(store)
            .recompute(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::WorkflowNotFound { .. }));
    }
}
